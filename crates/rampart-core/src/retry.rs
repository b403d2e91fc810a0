//! Exponential backoff parameters for command retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff schedule used by `execute_with_retry`.
///
/// `max_retries` counts retries after the initial attempt, so a command runs
/// at most `max_retries + 1` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the delay between retries.
    pub max_delay: Duration,
    /// Growth factor per retry (2.0 doubles the delay).
    pub exponential_base: f64,
    /// Jitter factor in `[0, 1]` randomizing each delay by up to that fraction.
    #[serde(default)]
    pub jitter_factor: f64,
}

impl RetryConfig {
    /// Creates a retry configuration without jitter.
    #[must_use]
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        exponential_base: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            exponential_base,
            jitter_factor: 0.0,
        }
    }

    /// Creates a configuration with no retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 2.0,
            jitter_factor: 0.0,
        }
    }

    /// Tight schedule for tests and local tools.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO, Duration::ZERO, 2.0)
    }

    /// Returns a copy with a different retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the jitter factor.
    #[must_use]
    pub const fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Delay before retry number `retry` (1-based). Retry 0 is the initial
    /// attempt and has no delay.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw_ms = self.initial_delay.as_millis() as f64 * self.exponential_base.powi(exponent);
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms.max(0.0) as u64)
    }

    /// Delay before retry `retry` with jitter applied.
    ///
    /// `random_factor` is a sample in `[0, 1]`; the result lies within
    /// `delay * (1 ± jitter_factor)`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn jittered_delay(&self, retry: u32, random_factor: f64) -> Duration {
        let base = self.delay_for_retry(retry);
        if self.jitter_factor <= 0.0 {
            return base;
        }
        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        let multiplier = 1.0 - jitter + 2.0 * jitter * random_factor.clamp(0.0, 1.0);
        Duration::from_millis((base.as_millis() as f64 * multiplier).max(0.0) as u64)
    }

    /// Whether another retry is allowed after `retries_used` retries.
    #[must_use]
    pub fn allows_retry(&self, retries_used: u32) -> bool {
        retries_used < self.max_retries
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(
            3,
            Duration::from_millis(500),
            Duration::from_secs(10),
            2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_and_cap() {
        let config = RetryConfig::new(
            5,
            Duration::from_millis(500),
            Duration::from_secs(3),
            2.0,
        );
        assert_eq!(config.delay_for_retry(0), Duration::ZERO);
        assert_eq!(config.delay_for_retry(1), Duration::from_millis(500));
        assert_eq!(config.delay_for_retry(2), Duration::from_millis(1000));
        assert_eq!(config.delay_for_retry(3), Duration::from_millis(2000));
        assert_eq!(config.delay_for_retry(4), Duration::from_secs(3));
        assert_eq!(config.delay_for_retry(40), Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_bounds() {
        let config = RetryConfig::new(
            3,
            Duration::from_millis(1000),
            Duration::from_secs(10),
            2.0,
        )
        .with_jitter(0.2);
        assert_eq!(config.jittered_delay(1, 0.0), Duration::from_millis(800));
        assert_eq!(config.jittered_delay(1, 1.0), Duration::from_millis(1200));
        assert_eq!(config.jittered_delay(1, 7.0), Duration::from_millis(1200));
    }

    #[test]
    fn test_allows_retry() {
        let config = RetryConfig::default();
        assert!(config.allows_retry(0));
        assert!(config.allows_retry(2));
        assert!(!config.allows_retry(3));
        assert!(!RetryConfig::no_retry().allows_retry(0));
    }
}
