// Export Engine - chunked scan loop with durable checkpoints

pub mod cancel;
pub mod constants;

pub use cancel::{cancel_channel, CancelSender, CancelToken};
use constants::*;

use crate::domain::{csv, ExportJob, ExportStatus, JobId};
use crate::error::{AppError, Result};
use crate::port::{ExportJobStore, ProductSource, ProgressSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chunk_size: u32,
    pub pacing_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pacing_delay: DEFAULT_PACING_DELAY,
        }
    }
}

/// How a non-erroring export run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed { rows_exported: i64 },
    Cancelled { rows_exported: i64 },
}

/// Handle to one running export task
pub struct ExecutionHandle {
    job_id: JobId,
    canceller: CancelSender,
    task: JoinHandle<Result<ExportOutcome>>,
}

impl ExecutionHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Request cooperative cancellation; the in-flight chunk completes first
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// Clone of the cancel handle (for registries and remote cancel)
    pub fn canceller(&self) -> CancelSender {
        self.canceller.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Await the export task
    pub async fn join(self) -> Result<ExportOutcome> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(AppError::Internal(format!(
                "export task join failed: {}",
                e
            ))),
        }
    }
}

/// Export engine.
///
/// One `start` call runs one export loop as a single tokio task. The loop
/// fetches rows strictly after the job's cursor, pushes each encoded chunk to
/// the sink, then persists the new checkpoint before the next fetch. Resume
/// is derived purely from the cursor on the job handed in; there is no
/// resume flag.
#[derive(Clone)]
pub struct ExportEngine {
    store: Arc<dyn ExportJobStore>,
    source: Arc<dyn ProductSource>,
    config: EngineConfig,
}

impl ExportEngine {
    pub fn new(
        store: Arc<dyn ExportJobStore>,
        source: Arc<dyn ProductSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Begin (or resume, when `job.cursor > 0`) the export loop.
    ///
    /// Returns immediately; the loop runs on its own task. Callers must
    /// ensure at most one engine run is active per job id at a time.
    pub fn start(&self, job: ExportJob, sink: Arc<dyn ProgressSink>) -> ExecutionHandle {
        let (canceller, token) = cancel_channel();
        let engine = self.clone();
        let job_id = job.id.clone();
        let task = tokio::spawn(async move { engine.run(job, sink, token).await });
        ExecutionHandle {
            job_id,
            canceller,
            task,
        }
    }

    async fn run(
        &self,
        mut job: ExportJob,
        sink: Arc<dyn ProgressSink>,
        cancel: CancelToken,
    ) -> Result<ExportOutcome> {
        info!(
            job_id = %job.id,
            cursor = %job.cursor,
            resume = job.is_resume(),
            "Export starting"
        );

        match self.drive(&mut job, &sink, cancel).await {
            Ok(outcome) => {
                match &outcome {
                    ExportOutcome::Completed { rows_exported } => {
                        info!(job_id = %job.id, rows_exported = %rows_exported, "Export complete")
                    }
                    ExportOutcome::Cancelled { rows_exported } => {
                        info!(
                            job_id = %job.id,
                            rows_exported = %rows_exported,
                            "Export cancelled, job left resumable"
                        )
                    }
                }
                Ok(outcome)
            }
            Err(AppError::Sink(e)) => {
                // The consumer is gone; store and source are fine. Leave the
                // job PROCESSING at its last checkpoint and emit nothing.
                warn!(job_id = %job.id, error = %e, "Sink unavailable, stopping with job resumable");
                Err(AppError::Sink(e))
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Export failed");
                if let Err(se) = self.store.set_status(&job.id, ExportStatus::Failed).await {
                    warn!(job_id = %job.id, error = %se, "Could not mark job FAILED");
                }
                if let Err(se) = sink.emit_failed(job.rows_exported, job.total_rows).await {
                    warn!(job_id = %job.id, error = %se, "Terminal failure event not delivered");
                }
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        job: &mut ExportJob,
        sink: &Arc<dyn ProgressSink>,
        mut cancel: CancelToken,
    ) -> Result<ExportOutcome> {
        self.store
            .set_status(&job.id, ExportStatus::Processing)
            .await?;

        // Every invocation produces a fresh output: header first, resume
        // included. A resumed run is not a byte-level continuation.
        sink.emit_data(csv::header().as_bytes()).await?;

        let chunk_size = self.config.chunk_size;
        loop {
            if cancel.is_cancelled() {
                return Ok(ExportOutcome::Cancelled {
                    rows_exported: job.rows_exported,
                });
            }

            let chunk = self
                .source
                .scan(&job.filters, job.cursor, chunk_size)
                .await?;
            if chunk.is_empty() {
                return self.finish(job, sink).await;
            }

            let payload = csv::encode_rows(&chunk);
            sink.emit_data(payload.as_bytes()).await?;

            let chunk_len = chunk.len() as i64;
            let next_cursor = chunk.last().map(|row| row.id).unwrap_or(job.cursor);
            let next_rows = job.rows_exported + chunk_len;

            // Durability checkpoint: must be acknowledged before the next
            // fetch. The in-memory copy only reflects persisted state.
            self.store
                .advance(&job.id, next_cursor, next_rows, ExportStatus::Processing)
                .await?;
            job.cursor = next_cursor;
            job.rows_exported = next_rows;

            sink.emit_progress(job.rows_exported, job.total_rows).await?;
            debug!(
                job_id = %job.id,
                cursor = %job.cursor,
                rows_exported = %job.rows_exported,
                "Chunk checkpointed"
            );

            // A short chunk proves the scan is exhausted; no extra empty
            // fetch needed.
            if chunk_len < chunk_size as i64 {
                return self.finish(job, sink).await;
            }

            tokio::select! {
                _ = sleep(self.config.pacing_delay) => {},
                _ = cancel.wait() => {},
            }
        }
    }

    async fn finish(
        &self,
        job: &mut ExportJob,
        sink: &Arc<dyn ProgressSink>,
    ) -> Result<ExportOutcome> {
        self.store.set_status(&job.id, ExportStatus::Done).await?;
        sink.emit_done(job.rows_exported).await?;
        Ok(ExportOutcome::Completed {
            rows_exported: job.rows_exported,
        })
    }
}
