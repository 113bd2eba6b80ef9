// Create Export Use Case

use crate::domain::{ExportFilters, ExportJob};
use crate::error::Result;
use crate::port::{Clock, ExportJobStore, IdProvider, ProductSource};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Create-export request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateExportRequest {
    #[serde(default)]
    pub filters: ExportFilters,
}

/// Execute the create-export use case
///
/// Counts matching rows once (the estimate frozen into the job), builds the
/// job at PENDING / cursor 0 with injected id and timestamp, and persists it.
///
/// # Arguments
///
/// * `store` - Export job store
/// * `source` - Product data source (for the row-count estimate)
/// * `id_provider` - ID generator (injected for determinism)
/// * `clock` - Clock (injected for determinism)
/// * `req` - Create request carrying the filter snapshot
pub async fn execute(
    store: &dyn ExportJobStore,
    source: &dyn ProductSource,
    id_provider: &dyn IdProvider,
    clock: &dyn Clock,
    req: CreateExportRequest,
) -> Result<ExportJob> {
    let total_rows = source.count(&req.filters).await?;

    let job_id = id_provider.generate_id();
    let created_at = clock.now_millis();
    let job = ExportJob::new(job_id, created_at, req.filters, total_rows);

    store.insert(&job).await?;

    info!(
        job_id = %job.id,
        total_rows = %job.total_rows,
        "Export job created"
    );
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExportStatus;
    use crate::port::clock::mocks::FixedClock;
    use crate::port::id_provider::mocks::SequenceIdProvider;
    use crate::port::job_store::mocks::MemoryJobStore;
    use crate::port::product_source::mocks::MockProductSource;

    #[tokio::test]
    async fn test_create_persists_pending_job_with_estimate() {
        let store = MemoryJobStore::new();
        let source = MockProductSource::seeded(42);
        let ids = SequenceIdProvider::new();
        let clock = FixedClock::fixed(777_000);

        let job = execute(
            &store,
            &source,
            &ids,
            &clock,
            CreateExportRequest::default(),
        )
        .await
        .unwrap();

        assert_eq!(job.id, "job-1");
        assert_eq!(job.status, ExportStatus::Pending);
        assert_eq!(job.cursor, 0);
        assert_eq!(job.total_rows, 42);
        assert_eq!(job.created_at, 777_000);

        let stored = store.find_by_id(&job.id).await.unwrap();
        assert!(stored.is_some(), "job should be persisted");
    }

    #[tokio::test]
    async fn test_create_propagates_count_failure_without_persisting() {
        let store = MemoryJobStore::new();
        let source = MockProductSource::seeded(5);
        source.set_fail_count(true);
        let ids = SequenceIdProvider::new();
        let clock = FixedClock::fixed(1);

        let result = execute(
            &store,
            &source,
            &ids,
            &clock,
            CreateExportRequest::default(),
        )
        .await;
        assert!(result.is_err(), "source outage must surface");
        assert_eq!(
            store
                .count_by_status(ExportStatus::Pending)
                .await
                .unwrap(),
            0,
            "no job may be persisted without an estimate"
        );
    }
}
