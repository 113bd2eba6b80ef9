// Export Job Store Port (Interface)

use crate::domain::{ExportJob, ExportStatus, JobId};
use crate::error::Result;
use async_trait::async_trait;

/// Persistence interface for export jobs.
///
/// Every operation is atomic with respect to a single job id. `advance` is
/// the engine's durability boundary: it must be acknowledged before the next
/// chunk is fetched.
#[async_trait]
pub trait ExportJobStore: Send + Sync {
    /// Insert a new job
    async fn insert(&self, job: &ExportJob) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<ExportJob>>;

    /// Persist a checkpoint: cursor, exported count and status written as one
    /// compare-and-write step.
    ///
    /// Idempotent when repeated with identical arguments (a retried write
    /// whose acknowledgment was lost is safe).
    ///
    /// # Errors
    /// - `AppError::Conflict` if the job no longer exists
    /// - `AppError::InvalidTransition` if `cursor` or `rows_exported` would
    ///   move backwards, or the status change is illegal
    async fn advance(
        &self,
        id: &JobId,
        cursor: i64,
        rows_exported: i64,
        status: ExportStatus,
    ) -> Result<()>;

    /// Transition job status without touching the checkpoint
    ///
    /// # Errors
    /// - `AppError::NotFound` if the job does not exist
    /// - `AppError::InvalidTransition` if the status change is illegal
    async fn set_status(&self, id: &JobId, status: ExportStatus) -> Result<()>;

    /// All jobs currently in `status` (recovery sweep, listing API)
    async fn list_by_status(&self, status: ExportStatus) -> Result<Vec<ExportJob>>;

    /// Count jobs by status
    async fn count_by_status(&self, status: ExportStatus) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory store honoring the same compare-and-write semantics as the
    /// SQLite adapter, with failure injection for outage paths.
    pub struct MemoryJobStore {
        jobs: Mutex<HashMap<JobId, ExportJob>>,
        stamp: AtomicI64,
        advance_calls: AtomicUsize,
        fail_advance: AtomicBool,
        fail_set_status: AtomicBool,
    }

    impl MemoryJobStore {
        pub fn new() -> Self {
            Self {
                jobs: Mutex::new(HashMap::new()),
                stamp: AtomicI64::new(1),
                advance_calls: AtomicUsize::new(0),
                fail_advance: AtomicBool::new(false),
                fail_set_status: AtomicBool::new(false),
            }
        }

        /// Make every subsequent `advance` fail with a store outage
        pub fn set_fail_advance(&self, fail: bool) {
            self.fail_advance.store(fail, Ordering::SeqCst);
        }

        /// Make every subsequent `set_status` fail with a store outage
        pub fn set_fail_set_status(&self, fail: bool) {
            self.fail_set_status.store(fail, Ordering::SeqCst);
        }

        pub fn advance_calls(&self) -> usize {
            self.advance_calls.load(Ordering::SeqCst)
        }

        fn now(&self) -> i64 {
            self.stamp.fetch_add(1, Ordering::SeqCst)
        }
    }

    impl Default for MemoryJobStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ExportJobStore for MemoryJobStore {
        async fn insert(&self, job: &ExportJob) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.contains_key(&job.id) {
                return Err(AppError::Conflict(format!(
                    "export job {} already exists",
                    job.id
                )));
            }
            jobs.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &JobId) -> Result<Option<ExportJob>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn advance(
            &self,
            id: &JobId,
            cursor: i64,
            rows_exported: i64,
            status: ExportStatus,
        ) -> Result<()> {
            self.advance_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_advance.load(Ordering::SeqCst) {
                return Err(AppError::Database("injected store outage".to_string()));
            }

            let now = self.now();
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(id).ok_or_else(|| {
                AppError::Conflict(format!("export job {} no longer exists", id))
            })?;

            if cursor < job.cursor || rows_exported < job.rows_exported {
                return Err(AppError::InvalidTransition(format!(
                    "checkpoint moved backwards: cursor {} -> {}, rows {} -> {}",
                    job.cursor, cursor, job.rows_exported, rows_exported
                )));
            }
            if !job.status.can_transition_to(&status) {
                return Err(AppError::InvalidTransition(format!(
                    "cannot move job {} from {} to {}",
                    id, job.status, status
                )));
            }

            job.cursor = cursor;
            job.rows_exported = rows_exported;
            job.status = status;
            job.updated_at = now;
            Ok(())
        }

        async fn set_status(&self, id: &JobId, status: ExportStatus) -> Result<()> {
            if self.fail_set_status.load(Ordering::SeqCst) {
                return Err(AppError::Database("injected store outage".to_string()));
            }

            let now = self.now();
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("export job {} not found", id)))?;

            let result = match status {
                ExportStatus::Processing => job.begin(now),
                ExportStatus::Done => job.complete(now),
                ExportStatus::Failed => job.fail(now),
                ExportStatus::Pending => {
                    return Err(AppError::InvalidTransition(format!(
                        "cannot move job {} from {} to {}",
                        id, job.status, status
                    )))
                }
            };
            result.map_err(|e| AppError::InvalidTransition(e.to_string()))
        }

        async fn list_by_status(&self, status: ExportStatus) -> Result<Vec<ExportJob>> {
            let mut matching: Vec<ExportJob> = self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|job| job.status == status)
                .cloned()
                .collect();
            matching.sort_by_key(|job| job.created_at);
            Ok(matching)
        }

        async fn count_by_status(&self, status: ExportStatus) -> Result<i64> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|job| job.status == status)
                .count() as i64)
        }
    }
}
