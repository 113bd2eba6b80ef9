// Startup recovery for orphaned exports

use crate::domain::ExportStatus;
use crate::error::Result;
use crate::port::ExportJobStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Startup recovery sweep.
///
/// At daemon startup no engine task exists yet, so every job still
/// PROCESSING was orphaned by a crash or hard kill. Marking them FAILED
/// keeps stored status truthful; the cursor is untouched, so the normal
/// FAILED -> PROCESSING resume path continues from the last checkpoint.
pub struct ExportRecovery {
    store: Arc<dyn ExportJobStore>,
}

impl ExportRecovery {
    pub fn new(store: Arc<dyn ExportJobStore>) -> Self {
        Self { store }
    }

    /// Sweep orphaned exports on daemon startup
    ///
    /// # Returns
    /// Number of jobs marked FAILED
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let orphaned = self.store.list_by_status(ExportStatus::Processing).await?;
        let mut recovered = 0;

        for job in orphaned {
            info!(
                job_id = %job.id,
                cursor = %job.cursor,
                rows_exported = %job.rows_exported,
                "Marking orphaned export FAILED (resumable)"
            );
            match self.store.set_status(&job.id, ExportStatus::Failed).await {
                Ok(()) => recovered += 1,
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Could not recover orphaned export")
                }
            }
        }

        info!(recovered = %recovered, "Export recovery sweep complete");
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExportFilters, ExportJob};
    use crate::port::job_store::mocks::MemoryJobStore;

    #[tokio::test]
    async fn test_sweep_fails_only_processing_jobs() {
        let store = Arc::new(MemoryJobStore::new());

        let mut orphan = ExportJob::new_test(ExportFilters::default(), 100);
        orphan.status = ExportStatus::Processing;
        orphan.cursor = 700;
        orphan.rows_exported = 700;
        store.insert(&orphan).await.unwrap();

        let mut done = ExportJob::new_test(ExportFilters::default(), 10);
        done.status = ExportStatus::Done;
        store.insert(&done).await.unwrap();

        let pending = ExportJob::new_test(ExportFilters::default(), 10);
        store.insert(&pending).await.unwrap();

        let recovery = ExportRecovery::new(store.clone());
        let recovered = recovery.recover_interrupted().await.unwrap();
        assert_eq!(recovered, 1);

        let swept = store.find_by_id(&orphan.id).await.unwrap().unwrap();
        assert_eq!(swept.status, ExportStatus::Failed);
        assert_eq!(swept.cursor, 700, "checkpoint survives the sweep");

        let untouched = store.find_by_id(&done.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, ExportStatus::Done);
        let untouched = store.find_by_id(&pending.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, ExportStatus::Pending);
    }

    #[tokio::test]
    async fn test_sweep_on_empty_store_is_zero() {
        let store = Arc::new(MemoryJobStore::new());
        let recovery = ExportRecovery::new(store);
        assert_eq!(recovery.recover_interrupted().await.unwrap(), 0);
    }
}
