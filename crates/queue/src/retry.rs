//! Retry policy with exponential backoff.

use std::time::Duration;

use tern_common::config::QueueConfig;

/// Retry configuration with exponential backoff.
///
/// The delay after the `n`th failed attempt (1-indexed) is
/// `min(initial_delay * 2^(n-1), max_delay)`. An item that has failed
/// `max_attempts` times is abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after which an item is abandoned.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(12 * 3600),
        }
    }
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_secs(config.initial_backoff_secs),
            max_delay: Duration::from_secs(config.max_backoff_secs),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next try after `attempts` failures (1-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether an item that has failed `attempts` times gets another try.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
