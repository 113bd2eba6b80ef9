// Engine constants (no magic values)
use std::time::Duration;

/// Rows per chunk: fetched, encoded, pushed and checkpointed as one unit
pub const DEFAULT_CHUNK_SIZE: u32 = 1000;

/// Delay between chunks, bounding sustained read load on the data source (100ms)
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(100);
