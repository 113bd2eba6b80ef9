//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use rowcast_core::domain::{ExportFilters, ExportJob, ExportStatus, ProductStatus};
use serde::{Deserialize, Serialize};

/// Job fields shared by status and list responses
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub job_id: String,
    pub status: String,
    pub filters: ExportFilters,
    pub cursor: i64,
    pub rows_exported: i64,
    pub total_rows: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&ExportJob> for JobView {
    fn from(job: &ExportJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status.to_string(),
            filters: job.filters.clone(),
            cursor: job.cursor,
            rows_exported: job.rows_exported,
            total_rows: job.total_rows,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// export.create.v1 - Create an export job from a filter snapshot
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateRequest {
    pub category: Option<String>,
    pub status: Option<ProductStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateResponse {
    pub job_id: String,
    pub status: String,
    pub total_rows: i64,
}

/// export.status.v1 - Inspect one export job
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub job_id: String,
}

/// export.list.v1 - List export jobs, optionally narrowed to one status
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListRequest {
    pub status: Option<ExportStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    pub total: usize,
    pub jobs: Vec<JobView>,
}

/// export.run.v1 - Start (or resume) an export run writing to a file
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub job_id: String,
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub job_id: String,
    pub status: String,
    pub output_path: String,
}

/// export.cancel.v1 - Cooperatively cancel a running export
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
}

/// export.stats.v1 - Daemon statistics
#[derive(Debug, Default, Deserialize)]
pub struct StatsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub total_jobs: i64,
    pub pending_jobs: i64,
    pub processing_jobs: i64,
    pub done_jobs: i64,
    pub failed_jobs: i64,
    pub active_exports: i64,
    pub uptime_seconds: i64,
}
