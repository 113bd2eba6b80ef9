// SQLite ExportJobStore Implementation

use async_trait::async_trait;
use rowcast_core::domain::{ExportFilters, ExportJob, ExportStatus, JobId};
use rowcast_core::error::{AppError, Result};
use rowcast_core::port::{Clock, ExportJobStore};
use sqlx::SqlitePool;
use std::sync::Arc;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

/// Status values a guarded UPDATE may transition from, for a given target
fn allowed_from(target: ExportStatus) -> Vec<String> {
    ExportStatus::ALL
        .iter()
        .filter(|from| from.can_transition_to(&target))
        .map(|from| from.to_string())
        .collect()
}

pub struct SqliteExportJobStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteExportJobStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn fetch_row(&self, id: &JobId) -> Result<Option<JobRow>> {
        sqlx::query_as::<_, JobRow>("SELECT * FROM export_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    /// The guarded `advance` UPDATE matched nothing; re-read to say why
    async fn explain_advance_rejection(
        &self,
        id: &JobId,
        cursor: i64,
        rows_exported: i64,
        status: ExportStatus,
    ) -> AppError {
        match self.fetch_row(id).await {
            Ok(None) => AppError::Conflict(format!("export job {} no longer exists", id)),
            Ok(Some(row)) => {
                if cursor < row.cursor || rows_exported < row.rows_exported {
                    AppError::InvalidTransition(format!(
                        "checkpoint moved backwards: cursor {} -> {}, rows {} -> {}",
                        row.cursor, cursor, row.rows_exported, rows_exported
                    ))
                } else {
                    AppError::InvalidTransition(format!(
                        "cannot move job {} from {} to {}",
                        id, row.status, status
                    ))
                }
            }
            Err(e) => e,
        }
    }
}

#[async_trait]
impl ExportJobStore for SqliteExportJobStore {
    async fn insert(&self, job: &ExportJob) -> Result<()> {
        let filters = serde_json::to_string(&job.filters)?;

        sqlx::query(
            r#"
            INSERT INTO export_jobs (
                id, filters, status, cursor, rows_exported, total_rows,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&filters)
        .bind(job.status.to_string())
        .bind(job.cursor)
        .bind(job.rows_exported)
        .bind(job.total_rows)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db)
                if db.kind() == sqlx::error::ErrorKind::UniqueViolation =>
            {
                AppError::Conflict(format!("export job {} already exists", job.id))
            }
            _ => map_sqlx_error(e),
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<ExportJob>> {
        Ok(self.fetch_row(id).await?.map(|row| row.into_job()))
    }

    async fn advance(
        &self,
        id: &JobId,
        cursor: i64,
        rows_exported: i64,
        status: ExportStatus,
    ) -> Result<()> {
        let allowed = allowed_from(status);
        if allowed.is_empty() {
            return Err(AppError::InvalidTransition(format!(
                "no legal transition into {} for job {}",
                status, id
            )));
        }

        let now = self.clock.now_millis();
        let placeholders = vec!["?"; allowed.len()].join(", ");

        // Compare-and-write: monotonic guards and the transition table live
        // in the predicate, so a lost race surfaces as zero rows affected
        let sql = format!(
            r#"
            UPDATE export_jobs
            SET cursor = ?, rows_exported = ?, status = ?, updated_at = ?
            WHERE id = ? AND cursor <= ? AND rows_exported <= ? AND status IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(cursor)
            .bind(rows_exported)
            .bind(status.to_string())
            .bind(now)
            .bind(id)
            .bind(cursor)
            .bind(rows_exported);
        for from in &allowed {
            query = query.bind(from);
        }

        let result = query.execute(&self.pool).await.map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(self
                .explain_advance_rejection(id, cursor, rows_exported, status)
                .await);
        }
        Ok(())
    }

    async fn set_status(&self, id: &JobId, status: ExportStatus) -> Result<()> {
        let allowed = allowed_from(status);
        if allowed.is_empty() {
            return Err(AppError::InvalidTransition(format!(
                "no legal transition into {} for job {}",
                status, id
            )));
        }

        let now = self.clock.now_millis();
        let placeholders = vec!["?"; allowed.len()].join(", ");

        let sql = format!(
            r#"
            UPDATE export_jobs
            SET status = ?, updated_at = ?
            WHERE id = ? AND status IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(status.to_string()).bind(now).bind(id);
        for from in &allowed {
            query = query.bind(from);
        }

        let result = query.execute(&self.pool).await.map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return match self.fetch_row(id).await? {
                None => Err(AppError::NotFound(format!("export job {} not found", id))),
                Some(row) => Err(AppError::InvalidTransition(format!(
                    "cannot move job {} from {} to {}",
                    id, row.status, status
                ))),
            };
        }
        Ok(())
    }

    async fn list_by_status(&self, status: ExportStatus) -> Result<Vec<ExportJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM export_jobs
            WHERE status = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|row| row.into_job()).collect())
    }

    async fn count_by_status(&self, status: ExportStatus) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM export_jobs WHERE status = ?")
                .bind(status.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(count)
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    filters: String,
    status: String,
    cursor: i64,
    rows_exported: i64,
    total_rows: i64,
    created_at: i64,
    updated_at: i64,
}

impl JobRow {
    fn into_job(self) -> ExportJob {
        let status = match self.status.as_str() {
            "PENDING" => ExportStatus::Pending,
            "PROCESSING" => ExportStatus::Processing,
            "DONE" => ExportStatus::Done,
            "FAILED" => ExportStatus::Failed,
            _ => ExportStatus::Failed, // Default fallback
        };

        let filters: ExportFilters = serde_json::from_str(&self.filters).unwrap_or_default();

        ExportJob {
            id: self.id,
            filters,
            status,
            cursor: self.cursor,
            rows_exported: self.rows_exported,
            total_rows: self.total_rows,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use rowcast_core::domain::ProductStatus;
    use rowcast_core::port::clock::mocks::FixedClock;

    async fn setup_store() -> SqliteExportJobStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteExportJobStore::new(pool, Arc::new(FixedClock::ticking(10_000, 1_000)))
    }

    fn job_with_filters() -> ExportJob {
        ExportJob::new_test(
            ExportFilters {
                category: Some("tools".to_string()),
                status: Some(ProductStatus::Active),
                search: Some("widget".to_string()),
            },
            250,
        )
    }

    #[tokio::test]
    async fn test_insert_and_find_roundtrips_filters() {
        let store = setup_store().await;
        let job = job_with_filters();
        store.insert(&job).await.unwrap();

        let found = store.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found.id, job.id);
        assert_eq!(found.filters, job.filters);
        assert_eq!(found.status, ExportStatus::Pending);
        assert_eq!(found.total_rows, 250);
    }

    #[tokio::test]
    async fn test_insert_duplicate_is_conflict() {
        let store = setup_store().await;
        let job = job_with_filters();
        store.insert(&job).await.unwrap();

        let err = store.insert(&job).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_advance_checkpoints_and_bumps_updated_at() {
        let store = setup_store().await;
        let job = job_with_filters();
        store.insert(&job).await.unwrap();
        store
            .set_status(&job.id, ExportStatus::Processing)
            .await
            .unwrap();

        store
            .advance(&job.id, 1000, 1000, ExportStatus::Processing)
            .await
            .unwrap();

        let found = store.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found.cursor, 1000);
        assert_eq!(found.rows_exported, 1000);
        assert!(
            found.updated_at > job.updated_at,
            "every write bumps updated_at"
        );

        // Identical retry is a no-op success
        store
            .advance(&job.id, 1000, 1000, ExportStatus::Processing)
            .await
            .expect("idempotent retry should succeed");
    }

    #[tokio::test]
    async fn test_advance_rejects_backward_cursor() {
        let store = setup_store().await;
        let job = job_with_filters();
        store.insert(&job).await.unwrap();
        store
            .set_status(&job.id, ExportStatus::Processing)
            .await
            .unwrap();
        store
            .advance(&job.id, 1000, 1000, ExportStatus::Processing)
            .await
            .unwrap();

        let err = store
            .advance(&job.id, 500, 1000, ExportStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        let err = store
            .advance(&job.id, 1000, 999, ExportStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_advance_on_missing_job_is_conflict() {
        let store = setup_store().await;
        let err = store
            .advance(&"ghost".to_string(), 10, 10, ExportStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_advance_cannot_leave_done() {
        let store = setup_store().await;
        let job = job_with_filters();
        store.insert(&job).await.unwrap();
        store
            .set_status(&job.id, ExportStatus::Processing)
            .await
            .unwrap();
        store.set_status(&job.id, ExportStatus::Done).await.unwrap();

        let err = store
            .advance(&job.id, 2000, 2000, ExportStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_set_status_enforces_state_machine() {
        let store = setup_store().await;
        let job = job_with_filters();
        store.insert(&job).await.unwrap();

        // Pending cannot terminate directly
        let err = store
            .set_status(&job.id, ExportStatus::Done)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        store
            .set_status(&job.id, ExportStatus::Processing)
            .await
            .unwrap();
        store
            .set_status(&job.id, ExportStatus::Failed)
            .await
            .unwrap();

        // Failed resumes into Processing
        store
            .set_status(&job.id, ExportStatus::Processing)
            .await
            .unwrap();
        store.set_status(&job.id, ExportStatus::Done).await.unwrap();

        // Done is final
        let err = store
            .set_status(&job.id, ExportStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_set_status_missing_job_is_not_found() {
        let store = setup_store().await;
        let err = store
            .set_status(&"ghost".to_string(), ExportStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_and_count_by_status() {
        let store = setup_store().await;
        for _ in 0..2 {
            store.insert(&job_with_filters()).await.unwrap();
        }
        let processing = job_with_filters();
        store.insert(&processing).await.unwrap();
        store
            .set_status(&processing.id, ExportStatus::Processing)
            .await
            .unwrap();

        let pending = store.list_by_status(ExportStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(
            store
                .count_by_status(ExportStatus::Processing)
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.count_by_status(ExportStatus::Done).await.unwrap(), 0);
    }
}
