// Export Job Domain Model

use serde::{Deserialize, Serialize};

/// Export job ID (UUID v4)
pub type JobId = String;

/// Export job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl ExportStatus {
    pub const ALL: [ExportStatus; 4] = [
        ExportStatus::Pending,
        ExportStatus::Processing,
        ExportStatus::Done,
        ExportStatus::Failed,
    ];

    /// Legal status transitions.
    ///
    /// `Processing -> Processing` is allowed so that checkpoint writes and
    /// idempotent loop re-entry do not need a special case. `Done` is final;
    /// `Failed` can be re-entered into `Processing` by a resume.
    pub fn can_transition_to(&self, next: &ExportStatus) -> bool {
        matches!(
            (self, next),
            (ExportStatus::Pending, ExportStatus::Processing)
                | (ExportStatus::Processing, ExportStatus::Processing)
                | (ExportStatus::Processing, ExportStatus::Done)
                | (ExportStatus::Processing, ExportStatus::Failed)
                | (ExportStatus::Failed, ExportStatus::Processing)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Done | ExportStatus::Failed)
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportStatus::Pending => write!(f, "PENDING"),
            ExportStatus::Processing => write!(f, "PROCESSING"),
            ExportStatus::Done => write!(f, "DONE"),
            ExportStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Filter snapshot captured when a job is created.
///
/// Immutable for the lifetime of the job; the scan always evaluates this
/// snapshot, never a live filter state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportFilters {
    pub category: Option<String>,
    pub status: Option<crate::domain::ProductStatus>,
    pub search: Option<String>,
}

impl ExportFilters {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.status.is_none() && self.search.is_none()
    }
}

/// Export Job Entity
///
/// `cursor` is the ordering key of the last row whose chunk was fully
/// persisted; `0` means the scan has not started. `cursor` and
/// `rows_exported` never move backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: JobId,
    pub filters: ExportFilters,
    pub status: ExportStatus,
    pub cursor: i64,
    pub rows_exported: i64,
    /// Row count matching `filters` at creation time. An estimate: rows
    /// inserted or deleted after creation are not reconciled.
    pub total_rows: i64,
    pub created_at: i64, // epoch ms
    pub updated_at: i64, // epoch ms
}

impl ExportJob {
    /// Create a new export job.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `filters` - Filter snapshot for the whole lifetime of the job
    /// * `total_rows` - Matching row count at creation time
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        filters: ExportFilters,
        total_rows: i64,
    ) -> Self {
        Self {
            id: id.into(),
            filters,
            status: ExportStatus::Pending,
            cursor: 0,
            rows_exported: 0,
            total_rows,
            created_at,
            updated_at: created_at,
        }
    }

    /// Create a test job with deterministic ID and timestamp.
    ///
    /// Uses a simple counter for deterministic test IDs (test-1, test-2, ...).
    /// Timestamps start at 1000 and increment by 1000.
    ///
    /// **Note**: This method should only be used in tests. For production code,
    /// always inject ID and time via providers.
    pub fn new_test(filters: ExportFilters, total_rows: i64) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let id = format!("test-{}", counter);
        let created_at = (counter * 1000) as i64;

        Self::new(id, created_at, filters, total_rows)
    }

    /// Whether a `start` call on this job resumes from a checkpoint.
    ///
    /// Resume is derived purely from the persisted cursor; there is no
    /// separate resume flag anywhere in the system.
    pub fn is_resume(&self) -> bool {
        self.cursor > 0
    }

    /// Transition to Processing (loop entry or resume) with explicit timestamp
    pub fn begin(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        self.transition(ExportStatus::Processing, now_millis)
    }

    /// Transition to Done (scan exhausted) with explicit timestamp
    pub fn complete(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        self.transition(ExportStatus::Done, now_millis)
    }

    /// Transition to Failed (unrecoverable error, cursor preserved) with
    /// explicit timestamp
    pub fn fail(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        self.transition(ExportStatus::Failed, now_millis)
    }

    fn transition(
        &mut self,
        next: ExportStatus,
        now_millis: i64,
    ) -> crate::domain::error::Result<()> {
        if !self.status.can_transition_to(&next) {
            return Err(crate::domain::error::DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now_millis;
        Ok(())
    }
}
