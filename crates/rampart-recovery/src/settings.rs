//! Recovery tuning.

use std::time::Duration;

use crate::error::{RecoveryError, RecoveryResult};

/// Learned patterns at or below this rate demote the matching rule to LOW.
pub const DEMOTE_BELOW_RATE: f64 = 0.3;

/// Tuning for the recovery engine and learned-pattern store.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoverySettings {
    /// EMA smoothing factor α in `(0, 1]`.
    pub smoothing_factor: f64,
    /// Minimum success rate for a learned pattern to surface as HIGH.
    pub learned_min_rate: f64,
    /// Minimum uses for a learned pattern to surface, or to demote a rule.
    pub learned_min_uses: u32,
    /// Timeout for fix commands.
    pub fix_timeout: Duration,
    /// Suggestions below this confidence fall back to manual handling.
    pub min_confidence: f64,
    /// Apply HIGH suggestions between retries without asking.
    pub auto_apply_high: bool,
    /// Persist the learned store after this many updates.
    pub flush_every: u32,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.3,
            learned_min_rate: 0.9,
            learned_min_uses: 3,
            fix_timeout: Duration::from_secs(120),
            min_confidence: 0.6,
            auto_apply_high: true,
            flush_every: 8,
        }
    }
}

impl RecoverySettings {
    /// Set the smoothing factor.
    #[must_use]
    pub fn with_smoothing_factor(mut self, alpha: f64) -> Self {
        self.smoothing_factor = alpha;
        self
    }

    /// Set the confidence floor.
    #[must_use]
    pub fn with_min_confidence(mut self, floor: f64) -> Self {
        self.min_confidence = floor;
        self
    }

    /// Set the flush interval.
    #[must_use]
    pub fn with_flush_every(mut self, updates: u32) -> Self {
        self.flush_every = updates;
        self
    }

    /// Enable or disable automatic HIGH fixes.
    #[must_use]
    pub fn with_auto_apply_high(mut self, enabled: bool) -> Self {
        self.auto_apply_high = enabled;
        self
    }

    /// Set the fix command timeout.
    #[must_use]
    pub fn with_fix_timeout(mut self, timeout: Duration) -> Self {
        self.fix_timeout = timeout;
        self
    }

    /// Reject out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::InvalidSettings`] naming the first bad field.
    pub fn validate(&self) -> RecoveryResult<()> {
        let alpha_in_range = self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0;
        if !alpha_in_range {
            return Err(RecoveryError::InvalidSettings(format!(
                "smoothing_factor must be in (0, 1], got {}",
                self.smoothing_factor
            )));
        }
        for (name, value) in [
            ("learned_min_rate", self.learned_min_rate),
            ("min_confidence", self.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RecoveryError::InvalidSettings(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if self.fix_timeout.is_zero() {
            return Err(RecoveryError::InvalidSettings(
                "fix_timeout must be positive".to_string(),
            ));
        }
        if self.flush_every == 0 {
            return Err(RecoveryError::InvalidSettings(
                "flush_every must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RecoverySettings::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_alpha() {
        assert!(
            RecoverySettings::default()
                .with_smoothing_factor(0.0)
                .validate()
                .is_err()
        );
        assert!(
            RecoverySettings::default()
                .with_smoothing_factor(1.5)
                .validate()
                .is_err()
        );
        assert!(
            RecoverySettings::default()
                .with_smoothing_factor(f64::NAN)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_rejects_bad_floor() {
        let err = RecoverySettings::default()
            .with_min_confidence(1.2)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("min_confidence"));
    }
}
