// Application Layer - Use Cases and Business Logic

pub mod engine;
pub mod export;
pub mod recovery;

// Re-exports
pub use engine::{
    cancel_channel, CancelSender, CancelToken, EngineConfig, ExecutionHandle, ExportEngine,
    ExportOutcome,
};
pub use recovery::ExportRecovery;
