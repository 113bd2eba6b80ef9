// Port Layer - Interfaces for external dependencies

pub mod clock; // For deterministic testing
pub mod id_provider;
pub mod job_store;
pub mod product_source;
pub mod progress_sink;

// Re-exports
pub use clock::Clock;
pub use id_provider::IdProvider;
pub use job_store::ExportJobStore;
pub use product_source::ProductSource;
pub use progress_sink::{ChannelSink, ProgressSink, SinkError, SinkEvent};
