// Rowcast Infrastructure - SQLite Adapters
// Implements: ExportJobStore, ProductSource

mod connection;
mod job_store;
mod migration;
mod product_source;

pub use connection::create_pool;
pub use job_store::SqliteExportJobStore;
pub use migration::run_migrations;
pub use product_source::SqliteProductSource;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
