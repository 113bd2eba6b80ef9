//! Active Export Registry
//!
//! Tracks in-flight export runs and enforces the single-writer rule: at most
//! one engine run per job id at a time.

use rowcast_core::application::CancelSender;
use rowcast_core::domain::JobId;
use rowcast_core::error::{AppError, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// State of one claimed run slot.
enum RunSlot {
    /// Claimed, sink setup still in progress. A cancel arriving now is
    /// remembered and forwarded once the run starts.
    Starting { cancel_requested: bool },
    Running(CancelSender),
}

/// Registry of running exports, keyed by job id.
///
/// The store's guarded writes reject interleaved checkpoints as a backstop,
/// but the registry stops a second run from ever starting: the job id is
/// claimed before any run resource (in particular the output file) is
/// touched, so a refused duplicate never holds anything it could destroy.
#[derive(Default)]
pub struct ActiveExports {
    active: Mutex<HashMap<JobId, RunSlot>>,
}

impl ActiveExports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the job id for a new run.
    ///
    /// Fails with `Conflict` while another run holds the id. The claim stays
    /// held through sink setup via the returned guard; dropping the guard
    /// without [`ClaimGuard::activate`] releases the slot, so a failed setup
    /// leaves the job startable again.
    pub fn claim(&self, job_id: &JobId) -> Result<ClaimGuard<'_>> {
        let mut active = self.active.lock().unwrap();
        if active.contains_key(job_id) {
            return Err(AppError::Conflict(format!(
                "export job {} is already running",
                job_id
            )));
        }
        active.insert(
            job_id.clone(),
            RunSlot::Starting {
                cancel_requested: false,
            },
        );
        debug!(job_id = %job_id, "Export run claimed");
        Ok(ClaimGuard {
            registry: self,
            job_id: job_id.clone(),
            activated: false,
        })
    }

    /// Release a finished run's slot
    pub fn release(&self, job_id: &JobId) {
        if self.active.lock().unwrap().remove(job_id).is_none() {
            warn!(job_id = %job_id, "Released an export that was not registered");
        }
    }

    /// Request cooperative cancellation of a claimed or running export.
    ///
    /// Returns `false` when no run holds the id. The in-flight chunk still
    /// completes and checkpoints before the task stops.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match self.active.lock().unwrap().get_mut(job_id) {
            Some(RunSlot::Starting { cancel_requested }) => {
                *cancel_requested = true;
                true
            }
            Some(RunSlot::Running(canceller)) => {
                canceller.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every active run (daemon shutdown). Returns how many were told
    /// to stop.
    pub fn cancel_all(&self) -> usize {
        let mut active = self.active.lock().unwrap();
        for slot in active.values_mut() {
            match slot {
                RunSlot::Starting { cancel_requested } => *cancel_requested = true,
                RunSlot::Running(canceller) => canceller.cancel(),
            }
        }
        active.len()
    }

    pub fn count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    pub fn is_active(&self, job_id: &JobId) -> bool {
        self.active.lock().unwrap().contains_key(job_id)
    }
}

/// Holds a claimed slot between `claim` and engine start.
///
/// Released on drop until [`activate`](Self::activate) hands the slot to the
/// running export, whose watcher releases it after the task ends.
#[must_use]
pub struct ClaimGuard<'a> {
    registry: &'a ActiveExports,
    job_id: JobId,
    activated: bool,
}

impl ClaimGuard<'_> {
    /// Attach the started run's cancel handle, keeping the slot claimed.
    ///
    /// A cancel that arrived while the slot was still starting is forwarded
    /// here, so no cancellation request is lost to the setup window.
    pub fn activate(mut self, canceller: CancelSender) {
        let mut active = self.registry.active.lock().unwrap();
        if let Some(RunSlot::Starting {
            cancel_requested: true,
        }) = active.get(&self.job_id)
        {
            canceller.cancel();
        }
        active.insert(self.job_id.clone(), RunSlot::Running(canceller));
        self.activated = true;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.activated {
            self.registry.active.lock().unwrap().remove(&self.job_id);
            debug!(job_id = %self.job_id, "Export claim released before start");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowcast_core::application::{EngineConfig, ExportEngine, ExportOutcome};
    use rowcast_core::domain::{ExportFilters, ExportJob};
    use rowcast_core::port::job_store::mocks::MemoryJobStore;
    use rowcast_core::port::product_source::mocks::MockProductSource;
    use rowcast_core::port::progress_sink::mocks::MemorySink;
    use rowcast_core::port::ExportJobStore;
    use std::sync::Arc;
    use std::time::Duration;

    // Slow enough that the run is still pacing when the test acts on it
    fn slow_engine(store: Arc<MemoryJobStore>, rows: i64) -> ExportEngine {
        let source = Arc::new(MockProductSource::seeded(rows));
        ExportEngine::new(
            store,
            source,
            EngineConfig {
                chunk_size: 10,
                pacing_delay: Duration::from_secs(60),
            },
        )
    }

    async fn insert_job(store: &MemoryJobStore, total_rows: i64) -> ExportJob {
        let job = ExportJob::new_test(ExportFilters::default(), total_rows);
        store.insert(&job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn test_second_claim_for_same_job_conflicts() {
        let store = Arc::new(MemoryJobStore::new());
        let engine = slow_engine(store.clone(), 5000);
        let registry = ActiveExports::new();
        let job = insert_job(&store, 5000).await;

        let claim = registry.claim(&job.id).unwrap();
        let handle = engine.start(job.clone(), Arc::new(MemorySink::new()));
        claim.activate(handle.canceller());
        assert!(registry.is_active(&job.id));

        let second = registry.claim(&job.id);
        assert!(matches!(second, Err(AppError::Conflict(_))));
        assert_eq!(registry.count(), 1, "the losing claim holds nothing");

        handle.cancel();
        let outcome = handle.join().await.unwrap();
        assert!(matches!(outcome, ExportOutcome::Cancelled { .. }));
        registry.release(&job.id);

        // Slot is free again once released
        let resumed = store.find_by_id(&job.id).await.unwrap().unwrap();
        let retry = registry.claim(&job.id).unwrap();
        let retry_handle = engine.start(resumed, Arc::new(MemorySink::new()));
        retry.activate(retry_handle.canceller());
        retry_handle.cancel();
    }

    /// A claim that never starts (sink setup failed) must not leave the job
    /// id occupied.
    #[test]
    fn test_dropped_claim_frees_the_slot() {
        let registry = ActiveExports::new();
        let job_id = "job-1".to_string();

        let claim = registry.claim(&job_id).unwrap();
        assert!(registry.is_active(&job_id));
        assert!(
            registry.claim(&job_id).is_err(),
            "slot is held before the run starts"
        );

        drop(claim);
        assert!(!registry.is_active(&job_id));
        assert_eq!(registry.count(), 0);

        let reclaim = registry.claim(&job_id);
        assert!(reclaim.is_ok());
    }

    /// A cancel that lands while the run is still setting up is forwarded to
    /// the engine task once it starts.
    #[tokio::test]
    async fn test_cancel_before_activation_reaches_the_run() {
        let store = Arc::new(MemoryJobStore::new());
        let engine = slow_engine(store.clone(), 5000);
        let registry = ActiveExports::new();
        let job = insert_job(&store, 5000).await;

        let claim = registry.claim(&job.id).unwrap();
        assert!(registry.cancel(&job.id), "claimed slot accepts the cancel");

        let handle = engine.start(job, Arc::new(MemorySink::new()));
        claim.activate(handle.canceller());

        let outcome = handle.join().await.unwrap();
        assert!(matches!(outcome, ExportOutcome::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_cancel_unknown_job_reports_inactive() {
        let registry = ActiveExports::new();
        assert!(!registry.cancel(&"missing".to_string()));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all_stops_every_run() {
        let store = Arc::new(MemoryJobStore::new());
        let engine = slow_engine(store.clone(), 5000);
        let registry = ActiveExports::new();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let job = insert_job(&store, 5000).await;
            let claim = registry.claim(&job.id).unwrap();
            let handle = engine.start(job, Arc::new(MemorySink::new()));
            claim.activate(handle.canceller());
            handles.push(handle);
        }

        assert_eq!(registry.cancel_all(), 3);
        for handle in handles {
            let outcome = handle.join().await.unwrap();
            assert!(matches!(outcome, ExportOutcome::Cancelled { .. }));
        }
    }
}
