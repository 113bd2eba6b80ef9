// Clock Port (for testability)

/// Clock interface (allows mocking in tests)
pub trait Clock: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;
}

/// System clock (production)
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Deterministic clock for tests.
    ///
    /// `fixed` always reads the same instant; `ticking` advances by a fixed
    /// step on every read so successive writes get distinct timestamps.
    pub struct FixedClock {
        next: AtomicI64,
        step: i64,
    }

    impl FixedClock {
        pub fn fixed(millis: i64) -> Self {
            Self {
                next: AtomicI64::new(millis),
                step: 0,
            }
        }

        pub fn ticking(start_millis: i64, step_millis: i64) -> Self {
            Self {
                next: AtomicI64::new(start_millis),
                step: step_millis,
            }
        }
    }

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.next.fetch_add(self.step, Ordering::SeqCst)
        }
    }
}
