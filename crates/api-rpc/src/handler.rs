//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::to_rpc_error;
use crate::registry::ActiveExports;
use crate::types::{
    CancelRequest, CancelResponse, CreateRequest, CreateResponse, JobView, ListRequest,
    ListResponse, RunRequest, RunResponse, StatsRequest, StatsResponse, StatusRequest,
};
use jsonrpsee::types::ErrorObjectOwned;
use rowcast_core::application::export::create;
use rowcast_core::application::ExportEngine;
use rowcast_core::domain::{ExportFilters, ExportStatus};
use rowcast_core::error::AppError;
use rowcast_core::port::{Clock, ExportJobStore, IdProvider, ProductSource, ProgressSink};
use rowcast_infra_fs::CsvFileSink;
use std::sync::Arc;
use tracing::debug;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    store: Arc<dyn ExportJobStore>,
    source: Arc<dyn ProductSource>,
    engine: ExportEngine,
    active: Arc<ActiveExports>,
    id_provider: Arc<dyn IdProvider>,
    clock: Arc<dyn Clock>,
    start_time: std::time::Instant,
}

impl RpcHandler {
    pub fn new(
        store: Arc<dyn ExportJobStore>,
        source: Arc<dyn ProductSource>,
        engine: ExportEngine,
        active: Arc<ActiveExports>,
        id_provider: Arc<dyn IdProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            source,
            engine,
            active,
            id_provider,
            clock,
            start_time: std::time::Instant::now(),
        }
    }

    /// export.create.v1
    pub async fn create(&self, params: CreateRequest) -> Result<CreateResponse, ErrorObjectOwned> {
        let req = create::CreateExportRequest {
            filters: ExportFilters {
                category: params.category,
                status: params.status,
                search: params.search,
            },
        };

        let job = create::execute(
            self.store.as_ref(),
            self.source.as_ref(),
            self.id_provider.as_ref(),
            self.clock.as_ref(),
            req,
        )
        .await
        .map_err(to_rpc_error)?;

        Ok(CreateResponse {
            status: job.status.to_string(),
            total_rows: job.total_rows,
            job_id: job.id,
        })
    }

    /// export.status.v1
    pub async fn status(&self, params: StatusRequest) -> Result<JobView, ErrorObjectOwned> {
        let job = self
            .store
            .find_by_id(&params.job_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!(
                    "Export job {} not found",
                    params.job_id
                )))
            })?;

        Ok(JobView::from(&job))
    }

    /// export.list.v1
    pub async fn list(&self, params: ListRequest) -> Result<ListResponse, ErrorObjectOwned> {
        let jobs = match params.status {
            Some(status) => self
                .store
                .list_by_status(status)
                .await
                .map_err(to_rpc_error)?,
            None => {
                let mut all = Vec::new();
                for status in ExportStatus::ALL {
                    all.extend(
                        self.store
                            .list_by_status(status)
                            .await
                            .map_err(to_rpc_error)?,
                    );
                }
                all.sort_by_key(|job| job.created_at);
                all
            }
        };

        Ok(ListResponse {
            total: jobs.len(),
            jobs: jobs.iter().map(JobView::from).collect(),
        })
    }

    /// export.run.v1
    ///
    /// Starts (or resumes, purely from the persisted cursor) the export loop
    /// and returns immediately; progress is observed via `export.status.v1`.
    pub async fn run(&self, params: RunRequest) -> Result<RunResponse, ErrorObjectOwned> {
        let job = self
            .store
            .find_by_id(&params.job_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!(
                    "Export job {} not found",
                    params.job_id
                )))
            })?;

        if job.status == ExportStatus::Done {
            return Err(to_rpc_error(AppError::InvalidTransition(format!(
                "Export job {} is already complete",
                params.job_id
            ))));
        }

        // Claim before opening the output file: a refused duplicate run has
        // then touched nothing, so the active run's partial file survives it.
        // If sink setup fails, dropping the guard frees the slot.
        let claim = self.active.claim(&params.job_id).map_err(to_rpc_error)?;

        let sink = CsvFileSink::create(&params.output_path)
            .await
            .map_err(|e| to_rpc_error(AppError::Sink(e)))?;
        let sink: Arc<dyn ProgressSink> = Arc::new(sink);

        debug!(
            job_id = %params.job_id,
            output_path = %params.output_path,
            resume = job.is_resume(),
            "Starting export run"
        );

        let handle = self.engine.start(job, sink);
        claim.activate(handle.canceller());

        // The run owns its registry slot until the task ends, whatever the
        // outcome; the engine has already logged it by then.
        let active = Arc::clone(&self.active);
        let job_id = params.job_id.clone();
        tokio::spawn(async move {
            let _ = handle.join().await;
            active.release(&job_id);
        });

        Ok(RunResponse {
            job_id: params.job_id,
            status: ExportStatus::Processing.to_string(),
            output_path: params.output_path,
        })
    }

    /// export.cancel.v1
    pub async fn cancel(&self, params: CancelRequest) -> Result<CancelResponse, ErrorObjectOwned> {
        // Check if job exists
        let _job = self
            .store
            .find_by_id(&params.job_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!(
                    "Export job {} not found",
                    params.job_id
                )))
            })?;

        if !self.active.cancel(&params.job_id) {
            return Err(to_rpc_error(AppError::Conflict(format!(
                "Export job {} has no active run",
                params.job_id
            ))));
        }

        Ok(CancelResponse {
            job_id: params.job_id,
            cancelled: true,
        })
    }

    /// export.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let pending = self
            .store
            .count_by_status(ExportStatus::Pending)
            .await
            .map_err(to_rpc_error)?;

        let processing = self
            .store
            .count_by_status(ExportStatus::Processing)
            .await
            .map_err(to_rpc_error)?;

        let done = self
            .store
            .count_by_status(ExportStatus::Done)
            .await
            .map_err(to_rpc_error)?;

        let failed = self
            .store
            .count_by_status(ExportStatus::Failed)
            .await
            .map_err(to_rpc_error)?;

        Ok(StatsResponse {
            total_jobs: pending + processing + done + failed,
            pending_jobs: pending,
            processing_jobs: processing,
            done_jobs: done,
            failed_jobs: failed,
            active_exports: self.active.count() as i64,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }
}
