// Time Provider Port (for testability)

use std::sync::Arc;

/// Time provider interface (allows mocking in tests)
pub trait TimeProvider: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Simulated clock that starts at an arbitrary instant and then advances
/// at the pace of its base clock.
///
/// Used when the scheduler is restarted with an overridden "now".
pub struct OffsetTimeProvider {
    base: Arc<dyn TimeProvider>,
    offset_millis: i64,
}

impl OffsetTimeProvider {
    /// Clock whose current reading is `simulated_now`
    pub fn starting_at(base: Arc<dyn TimeProvider>, simulated_now: i64) -> Self {
        let offset_millis = simulated_now - base.now_millis();
        Self {
            base,
            offset_millis,
        }
    }
}

impl TimeProvider for OffsetTimeProvider {
    fn now_millis(&self) -> i64 {
        self.base.now_millis() + self.offset_millis
    }
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock frozen at a settable instant
    pub struct FixedTimeProvider {
        now: AtomicI64,
    }

    impl FixedTimeProvider {
        pub fn new(now: i64) -> Self {
            Self {
                now: AtomicI64::new(now),
            }
        }

        pub fn set(&self, now: i64) {
            self.now.store(now, Ordering::SeqCst);
        }

        pub fn advance(&self, millis: i64) {
            self.now.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl TimeProvider for FixedTimeProvider {
        fn now_millis(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::FixedTimeProvider;
    use super::*;

    #[test]
    fn test_offset_clock_follows_base() {
        let base = Arc::new(FixedTimeProvider::new(1_000));
        let clock = OffsetTimeProvider::starting_at(base.clone(), 5_000_000);

        assert_eq!(clock.now_millis(), 5_000_000);

        base.advance(250);
        assert_eq!(clock.now_millis(), 5_000_250);
    }
}
