//! Exponential backoff retry policy for calls the priority queue dispatches.

use std::time::Duration;

use rand::Rng;
use relaycore_core::RelayError;

/// Retry tunables. Mirrors the queue's `retryDelayMs`/`maxRetries` options.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Base delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any single computed delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Maximum number of retry attempts (not counting the initial try).
    pub max_retries: u32,
    /// Whether to add random jitter to the computed delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            max_retries: 3,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// `retryDelayMs × 2^(retryCount−1)`, capped at `max_delay_ms` and
    /// optionally jittered by up to ±20%.
    #[must_use]
    pub fn delay_for_attempt(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1);
        let raw = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX).max(1));
        let capped = raw.min(self.max_delay_ms);
        let millis = if self.jitter {
            let jitter_span = (capped as f64 * 0.2) as i64;
            if jitter_span == 0 {
                capped
            } else {
                let offset = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
                (capped as i64 + offset).max(0) as u64
            }
        } else {
            capped
        };
        Duration::from_millis(millis)
    }

    /// Whether `retry_count` is still within the configured attempt
    /// budget.
    #[must_use]
    pub const fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}

/// Whether `error` is the kind of failure the resilience layer should
/// retry (timeouts and non-timeout provider failures).
#[must_use]
pub fn is_retryable(error: &RelayError) -> bool {
    error.is_retryable()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt_without_jitter() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for_attempt(1).as_millis(), 500);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 1000);
        assert_eq!(config.delay_for_attempt(3).as_millis(), 2000);
    }

    #[test]
    fn delay_is_capped() {
        let config = RetryConfig {
            base_delay_ms: 10_000,
            max_delay_ms: 15_000,
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for_attempt(5).as_millis(), 15_000);
    }

    #[test]
    fn should_retry_respects_max_retries() {
        let config = RetryConfig::default();
        assert!(config.should_retry(0));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
    }
}
