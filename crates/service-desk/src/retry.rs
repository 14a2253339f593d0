//! Exponential backoff policy for the service desk client.

use std::time::Duration;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3 (including the first)
/// - `initial_delay`: 500ms
/// - `max_delay`: 5 seconds
/// - `multiplier`: 2 (delay doubles each retry)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap for the exponential backoff.
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(5000),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the `completed`-th failed attempt.
    ///
    /// `delay_after(1)` is `initial_delay`; each further attempt multiplies
    /// it, capped at `max_delay`.
    pub fn delay_after(&self, completed: u32) -> Duration {
        let exponent = completed.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}
