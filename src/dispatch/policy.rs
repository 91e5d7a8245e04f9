//! Backoff applied between timed-out attempts.

use std::time::Duration;

/// Exponential backoff between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    initial: Duration,
    max: Duration,
    multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1_000), Duration::from_millis(30_000), 2)
    }
}

impl RetryPolicy {
    /// Creates a policy. A multiplier of zero is treated as one.
    #[must_use]
    pub const fn new(initial: Duration, max: Duration, multiplier: u32) -> Self {
        Self {
            initial,
            max,
            multiplier: if multiplier == 0 { 1 } else { multiplier },
        }
    }

    /// A policy that retries immediately.
    #[must_use]
    pub const fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1)
    }

    /// Returns the delay before publishing attempt number `retry_count`
    /// (1 for the first retry).
    #[must_use]
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1);
        let factor = self.multiplier.checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
