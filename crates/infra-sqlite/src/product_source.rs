// SQLite ProductSource Implementation

use async_trait::async_trait;
use rowcast_core::domain::{ExportFilters, Product, ProductStatus};
use rowcast_core::error::{AppError, Result};
use rowcast_core::port::ProductSource;
use sqlx::SqlitePool;

// Scan/count failures surface as AppError::DataSource: the engine marks the
// job FAILED with its cursor preserved and a later start resumes.
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            AppError::DataSource(format!("Database error: {}", db_err.message()))
        }
        _ => AppError::DataSource(err.to_string()),
    }
}

/// Escape LIKE wildcards so user-supplied search text matches literally
fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Filter clauses for the dynamic WHERE, with binds in clause order.
///
/// The cursor bound (`id > ?`) is not part of the predicate: `count` matches
/// the whole filtered dataset, only `scan` narrows by cursor.
fn filter_predicate(filters: &ExportFilters) -> (Vec<String>, Vec<String>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();

    if let Some(category) = &filters.category {
        clauses.push("category = ?".to_string());
        binds.push(category.clone());
    }
    if let Some(status) = &filters.status {
        clauses.push("status = ?".to_string());
        binds.push(status.as_str().to_string());
    }
    if let Some(search) = &filters.search {
        // SQLite LIKE is case-insensitive for ASCII
        clauses.push("(name LIKE ? ESCAPE '\\' OR sku LIKE ? ESCAPE '\\')".to_string());
        let pattern = format!("%{}%", escape_like(search));
        binds.push(pattern.clone());
        binds.push(pattern);
    }

    (clauses, binds)
}

/// Read-only scan adapter over the `products` table.
///
/// `id` is an INTEGER PRIMARY KEY (the rowid), so `id > ? ORDER BY id` is an
/// index range scan: a resume costs O(log n + chunk) wherever the cursor is,
/// never a linear skip.
pub struct SqliteProductSource {
    pool: SqlitePool,
}

impl SqliteProductSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductSource for SqliteProductSource {
    async fn scan(
        &self,
        filters: &ExportFilters,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<Product>> {
        let (clauses, binds) = filter_predicate(filters);

        let mut sql = String::from("SELECT * FROM products WHERE id > ?");
        for clause in &clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        sql.push_str(" ORDER BY id ASC LIMIT ?");

        let mut query = sqlx::query_as::<_, ProductRow>(&sql).bind(after_id);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|row| row.into_product()).collect())
    }

    async fn count(&self, filters: &ExportFilters) -> Result<i64> {
        let (clauses, binds) = filter_predicate(filters);

        let mut sql = String::from("SELECT COUNT(*) FROM products");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        query.fetch_one(&self.pool).await.map_err(map_sqlx_error)
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    sku: String,
    category: String,
    status: String,
    price_cents: i64,
    created_at: i64,
}

impl ProductRow {
    fn into_product(self) -> Product {
        let status = self.status.parse().unwrap_or(ProductStatus::Inactive); // Default fallback

        Product {
            id: self.id,
            name: self.name,
            sku: self.sku,
            category: self.category,
            status,
            price_cents: self.price_cents,
            created_at: self.created_at,
        }
    }
}
