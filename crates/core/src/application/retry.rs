// Charge retry policy
use crate::application::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use std::time::Duration;
use tracing::warn;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Charge again after the delay
    Retry(Duration),
    /// Attempts used up; the invoice stays PENDING until next cycle
    Exhausted,
}

/// Retry policy for the charge-retry state machine
///
/// Determines if a failed charge should be attempted again based on:
/// - Attempt index of the failed charge
/// - Maximum attempts allowed (ignored when `unbounded`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per invoice, including the first one
    pub max_attempts: u32,
    /// Retry until the charge succeeds (test/operational override)
    pub unbounded: bool,
    /// Wait between two attempts on the same invoice
    pub retry_delay: Duration,
    /// A charge taking longer than this counts as failed
    pub charge_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            unbounded: false,
            retry_delay: DEFAULT_RETRY_DELAY,
            charge_timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn bounded(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
            ..Self::default()
        }
    }

    /// Retry forever without waiting between attempts
    ///
    /// Fast-forwarded test cycles use this so every pending invoice ends up
    /// PAID within one run.
    pub fn unbounded_immediate(&self) -> Self {
        Self {
            unbounded: true,
            retry_delay: Duration::ZERO,
            ..self.clone()
        }
    }

    pub fn with_charge_timeout(mut self, timeout: Duration) -> Self {
        self.charge_timeout = Some(timeout);
        self
    }

    /// Decide what to do after the zero-based attempt `attempt` failed
    ///
    /// # Example
    /// ```text
    /// let policy = RetryPolicy::default(); // 3 attempts
    /// policy.should_retry(0) // Retry(1s)
    /// policy.should_retry(1) // Retry(1s)
    /// policy.should_retry(2) // Exhausted
    /// ```
    pub fn should_retry(&self, attempt: u32) -> RetryDecision {
        if self.unbounded || attempt.saturating_add(1) < self.max_attempts {
            return RetryDecision::Retry(self.retry_delay);
        }

        warn!(
            attempt = attempt,
            max_attempts = self.max_attempts,
            "Max charge attempts reached"
        );
        RetryDecision::Exhausted
    }
}
