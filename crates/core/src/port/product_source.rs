// Product Source Port (Interface)

use crate::domain::{ExportFilters, Product};
use crate::error::Result;
use async_trait::async_trait;

/// Read-only interface over the exported dataset.
///
/// `scan` serves rows whose `id` is strictly greater than `after_id`,
/// ordered ascending, at most `limit` of them. Implementations must back
/// this with an index on `id` so a resume costs O(log n + limit) no matter
/// how far the cursor has moved.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Fetch the next chunk of matching rows after the cursor
    async fn scan(&self, filters: &ExportFilters, after_id: i64, limit: u32)
        -> Result<Vec<Product>>;

    /// Count matching rows (the creation-time estimate)
    async fn count(&self, filters: &ExportFilters) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::ProductStatus;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fixed-dataset source for engine tests.
    ///
    /// Serves the whole dataset regardless of filters (filter evaluation is
    /// the SQLite adapter's concern); records every scan's lower bound so
    /// tests can assert fetch counts and resume points.
    pub struct MockProductSource {
        rows: Vec<Product>,
        scan_bounds: Mutex<Vec<i64>>,
        scan_calls: AtomicUsize,
        fail_from_call: Option<usize>,
        fail_count: AtomicBool,
    }

    impl MockProductSource {
        pub fn new(mut rows: Vec<Product>) -> Self {
            rows.sort_by_key(|row| row.id);
            Self {
                rows,
                scan_bounds: Mutex::new(Vec::new()),
                scan_calls: AtomicUsize::new(0),
                fail_from_call: None,
                fail_count: AtomicBool::new(false),
            }
        }

        pub fn empty() -> Self {
            Self::new(Vec::new())
        }

        /// Plain products with ids 1..=count (building block for datasets)
        pub fn seed_rows(count: i64) -> Vec<Product> {
            (1..=count)
                .map(|id| Product {
                    id,
                    name: format!("Product {}", id),
                    sku: format!("SKU-{:06}", id),
                    category: "tools".to_string(),
                    status: ProductStatus::Active,
                    price_cents: 1000 + id,
                    created_at: id * 1000,
                })
                .collect()
        }

        /// Dataset of `count` plain products with ids 1..=count
        pub fn seeded(count: i64) -> Self {
            Self::new(Self::seed_rows(count))
        }

        /// Fail every scan from the `n`th call (1-based) onwards
        pub fn failing_from_call(rows: Vec<Product>, n: usize) -> Self {
            let mut source = Self::new(rows);
            source.fail_from_call = Some(n);
            source
        }

        /// Make `count` fail with a source outage
        pub fn set_fail_count(&self, fail: bool) {
            self.fail_count.store(fail, Ordering::SeqCst);
        }

        pub fn scan_calls(&self) -> usize {
            self.scan_calls.load(Ordering::SeqCst)
        }

        /// Lower bound (`after_id`) of each scan, in call order
        pub fn scan_bounds(&self) -> Vec<i64> {
            self.scan_bounds.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProductSource for MockProductSource {
        async fn scan(
            &self,
            _filters: &ExportFilters,
            after_id: i64,
            limit: u32,
        ) -> Result<Vec<Product>> {
            let call = self.scan_calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.scan_bounds.lock().unwrap().push(after_id);

            if let Some(from) = self.fail_from_call {
                if call >= from {
                    return Err(AppError::DataSource("injected source outage".to_string()));
                }
            }

            Ok(self
                .rows
                .iter()
                .filter(|row| row.id > after_id)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn count(&self, _filters: &ExportFilters) -> Result<i64> {
            if self.fail_count.load(Ordering::SeqCst) {
                return Err(AppError::DataSource("injected source outage".to_string()));
            }
            Ok(self.rows.len() as i64)
        }
    }
}
