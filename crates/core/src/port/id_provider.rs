// ID Provider Port (for deterministic testing)

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new unique export job ID
    fn generate_id(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Sequential provider yielding "job-1", "job-2", ... per instance
    pub struct SequenceIdProvider {
        counter: AtomicU64,
    }

    impl SequenceIdProvider {
        pub fn new() -> Self {
            Self {
                counter: AtomicU64::new(1),
            }
        }
    }

    impl Default for SequenceIdProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    impl IdProvider for SequenceIdProvider {
        fn generate_id(&self) -> String {
            format!("job-{}", self.counter.fetch_add(1, Ordering::SeqCst))
        }
    }
}
