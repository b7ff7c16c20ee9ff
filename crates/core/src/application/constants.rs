// Billing constants (No magic values)
use std::time::Duration;

/// One hour in milliseconds
pub const HOUR_MILLIS: i64 = 3_600_000;

/// Hours after 00:00 UTC on day 1 during which the current month is still
/// treated as the upcoming cycle.
///
/// The furthest-east zone is UTC+14, which reaches local midnight of day 1
/// ten hours before UTC does.
pub const CYCLE_START_GRACE_HOURS: u32 = 10;

/// Total charge attempts per invoice per cycle (1 initial + 2 retries)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay between charge attempts (1s)
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
