// Progress Sink Port (Interface)

use async_trait::async_trait;
use thiserror::Error;

/// Sink-side failure.
///
/// A sink failure means the consumer is gone or its backing IO broke. The
/// engine reacts by stopping the loop with the job still resumable; it does
/// not mark the job failed, because store and data source are fine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Sink closed: {0}")]
    Closed(String),

    #[error("Sink IO error: {0}")]
    Io(String),
}

/// Event interface the export engine emits to.
///
/// Implementations decide buffering and transport; the engine only defines
/// the call sequence: header and chunk data in scan order, one progress tick
/// after each persisted checkpoint, and exactly one terminal event per
/// non-cancelled run (unless the sink itself failed).
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Push one data unit (the header line or an encoded chunk)
    async fn emit_data(&self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Progress tick following a persisted checkpoint
    async fn emit_progress(&self, rows_exported: i64, total_rows: i64) -> Result<(), SinkError>;

    /// Terminal success event
    async fn emit_done(&self, rows_exported: i64) -> Result<(), SinkError>;

    /// Terminal failure event
    async fn emit_failed(&self, rows_exported: i64, total_rows: i64) -> Result<(), SinkError>;
}

/// Materialized sink event (channel payloads, test assertions)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Data(Vec<u8>),
    Progress { rows_exported: i64, total_rows: i64 },
    Done { rows_exported: i64 },
    Failed { rows_exported: i64, total_rows: i64 },
}

/// Push-event stream over a bounded tokio channel.
///
/// The receiver half is the consumer. Once it is dropped, the next emission
/// fails with `SinkError::Closed`, which is how a disconnected consumer
/// surfaces to the engine.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::Sender<SinkEvent>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, tokio::sync::mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = tokio::sync::mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    async fn push(&self, event: SinkEvent) -> Result<(), SinkError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| SinkError::Closed("event receiver dropped".to_string()))
    }
}

#[async_trait]
impl ProgressSink for ChannelSink {
    async fn emit_data(&self, bytes: &[u8]) -> Result<(), SinkError> {
        self.push(SinkEvent::Data(bytes.to_vec())).await
    }

    async fn emit_progress(&self, rows_exported: i64, total_rows: i64) -> Result<(), SinkError> {
        self.push(SinkEvent::Progress {
            rows_exported,
            total_rows,
        })
        .await
    }

    async fn emit_done(&self, rows_exported: i64) -> Result<(), SinkError> {
        self.push(SinkEvent::Done { rows_exported }).await
    }

    async fn emit_failed(&self, rows_exported: i64, total_rows: i64) -> Result<(), SinkError> {
        self.push(SinkEvent::Failed {
            rows_exported,
            total_rows,
        })
        .await
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Recording sink with optional failure injection.
    ///
    /// `failing_from_data(n)` makes the `n`th `emit_data` call (1-based) and
    /// everything after it fail, which is how tests simulate a consumer
    /// dying mid-stream.
    pub struct MemorySink {
        events: Mutex<Vec<SinkEvent>>,
        data_calls: AtomicUsize,
        fail_from_data: Option<usize>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                data_calls: AtomicUsize::new(0),
                fail_from_data: None,
            }
        }

        pub fn failing_from_data(n: usize) -> Self {
            let mut sink = Self::new();
            sink.fail_from_data = Some(n);
            sink
        }

        pub fn events(&self) -> Vec<SinkEvent> {
            self.events.lock().unwrap().clone()
        }

        /// Only the data payloads, in emission order
        pub fn data_payloads(&self) -> Vec<Vec<u8>> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    SinkEvent::Data(bytes) => Some(bytes),
                    _ => None,
                })
                .collect()
        }

        pub fn progress_events(&self) -> Vec<(i64, i64)> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    SinkEvent::Progress {
                        rows_exported,
                        total_rows,
                    } => Some((rows_exported, total_rows)),
                    _ => None,
                })
                .collect()
        }

        /// Done/Failed events only; a well-behaved run has at most one
        pub fn terminal_events(&self) -> Vec<SinkEvent> {
            self.events()
                .into_iter()
                .filter(|event| {
                    matches!(event, SinkEvent::Done { .. } | SinkEvent::Failed { .. })
                })
                .collect()
        }

        fn record(&self, event: SinkEvent) -> Result<(), SinkError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    impl Default for MemorySink {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ProgressSink for MemorySink {
        async fn emit_data(&self, bytes: &[u8]) -> Result<(), SinkError> {
            let call = self.data_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(from) = self.fail_from_data {
                if call >= from {
                    return Err(SinkError::Closed("injected sink failure".to_string()));
                }
            }
            self.record(SinkEvent::Data(bytes.to_vec()))
        }

        async fn emit_progress(
            &self,
            rows_exported: i64,
            total_rows: i64,
        ) -> Result<(), SinkError> {
            self.record(SinkEvent::Progress {
                rows_exported,
                total_rows,
            })
        }

        async fn emit_done(&self, rows_exported: i64) -> Result<(), SinkError> {
            self.record(SinkEvent::Done { rows_exported })
        }

        async fn emit_failed(&self, rows_exported: i64, total_rows: i64) -> Result<(), SinkError> {
            self.record(SinkEvent::Failed {
                rows_exported,
                total_rows,
            })
        }
    }
}
