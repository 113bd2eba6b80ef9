// Domain Layer - Pure business logic and entities

pub mod csv;
pub mod error;
pub mod job;
pub mod product;

// Re-exports
pub use error::DomainError;
pub use job::{ExportFilters, ExportJob, ExportStatus, JobId};
pub use product::{Product, ProductStatus};
