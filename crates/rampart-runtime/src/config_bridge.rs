//! Bridge from `rampart_config::Config` to component types.
//!
//! The config crate depends on no other rampart crate. Each component keeps
//! its own settings type; this module translates the unified configuration
//! into them so the conversion happens in one place.

use std::path::Path;
use std::time::Duration;

use rampart_approval::{LedgerOptions, LedgerResult, RiskClassifier};
use rampart_config::Config;
use rampart_core::RetryConfig;
use rampart_exec::ExecutorConfig;
use rampart_recovery::RecoverySettings;
use rampart_telemetry::{LogConfig, TelemetryResult};

/// File name of the persisted command history under the state directory.
pub const HISTORY_FILE: &str = "history.jsonl";

/// File name of the learned-pattern store under the state directory.
pub const LEARNED_FILE: &str = "learned.json";

/// Convert config to [`LedgerOptions`].
#[must_use]
pub fn to_ledger_options(cfg: &Config) -> LedgerOptions {
    let options = LedgerOptions::default()
        .with_auto_approve_safe(cfg.approval.auto_approve_safe)
        .with_max_undo_points(cfg.undo.max_points);
    match cfg.approval.timeout_secs {
        Some(secs) => options.with_timeout(Duration::from_secs(secs)),
        None => options,
    }
}

/// Build the [`RiskClassifier`] with the configured extra rules.
///
/// # Errors
///
/// Returns an error if an extra pattern is not a valid regex.
pub fn to_risk_classifier(cfg: &Config) -> LedgerResult<RiskClassifier> {
    RiskClassifier::with_rules(&cfg.risk.extra_dangerous, &cfg.risk.extra_safe)
}

/// Convert config to [`ExecutorConfig`].
///
/// Commands run in `workspace_root`. The history is persisted under
/// `state_dir` only when `executor.persist_history` is set.
#[must_use]
pub fn to_executor_config(cfg: &Config, workspace_root: &Path, state_dir: &Path) -> ExecutorConfig {
    let mut config = ExecutorConfig {
        shell: cfg.executor.shell.clone(),
        ..ExecutorConfig::default()
    }
    .with_working_dir(workspace_root)
    .with_default_timeout(Duration::from_secs(cfg.executor.default_timeout_secs))
    .with_history_size(cfg.executor.history_size)
    .with_max_output_bytes(cfg.executor.max_output_bytes);
    if cfg.executor.persist_history {
        config = config.with_history_path(state_dir.join(HISTORY_FILE));
    }
    config
}

/// Convert the `[executor.retry]` section to a [`RetryConfig`].
#[must_use]
pub fn to_retry_config(cfg: &Config) -> RetryConfig {
    let retry = &cfg.executor.retry;
    RetryConfig::new(
        retry.max_retries,
        Duration::from_millis(retry.initial_delay_ms),
        Duration::from_millis(retry.max_delay_ms),
        retry.exponential_base,
    )
}

/// Convert the `[recovery]` section to [`RecoverySettings`].
#[must_use]
pub fn to_recovery_settings(cfg: &Config) -> RecoverySettings {
    let recovery = &cfg.recovery;
    RecoverySettings {
        smoothing_factor: recovery.smoothing_factor,
        learned_min_rate: recovery.learned_min_rate,
        learned_min_uses: recovery.learned_min_uses,
        fix_timeout: Duration::from_secs(recovery.fix_timeout_secs),
        min_confidence: recovery.min_confidence,
        auto_apply_high: recovery.auto_apply_high,
        flush_every: recovery.flush_every,
    }
}

/// Convert the `[logging]` section to a [`LogConfig`].
///
/// # Errors
///
/// Returns an error if the format name is unknown.
pub fn to_log_config(cfg: &Config) -> TelemetryResult<LogConfig> {
    LogConfig::from_section(&cfg.logging)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::RiskTier;

    #[test]
    fn test_defaults_convert() {
        let cfg = Config::default();
        let options = to_ledger_options(&cfg);
        assert_eq!(options.auto_approve_safe, cfg.approval.auto_approve_safe);
        assert_eq!(options.max_undo_points, cfg.undo.max_points);
        assert!(options.timeout.is_none());

        let settings = to_recovery_settings(&cfg);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.flush_every, cfg.recovery.flush_every);
    }

    #[test]
    fn test_approval_timeout() {
        let mut cfg = Config::default();
        cfg.approval.timeout_secs = Some(5);
        assert_eq!(
            to_ledger_options(&cfg).timeout,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_history_path_only_when_persisted() {
        let mut cfg = Config::default();
        let root = Path::new("/work");
        let state = Path::new("/work/.rampart/state");
        cfg.executor.persist_history = false;
        assert!(to_executor_config(&cfg, root, state).history_path.is_none());

        cfg.executor.persist_history = true;
        let config = to_executor_config(&cfg, root, state);
        assert_eq!(config.history_path, Some(state.join(HISTORY_FILE)));
        assert_eq!(config.working_dir.as_deref(), Some(root));
        assert_eq!(
            config.default_timeout,
            Duration::from_secs(cfg.executor.default_timeout_secs)
        );
    }

    #[test]
    fn test_retry_config() {
        let mut cfg = Config::default();
        cfg.executor.retry.max_retries = 5;
        cfg.executor.retry.initial_delay_ms = 100;
        let retry = to_retry_config(&cfg);
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_extra_rules_reach_classifier() {
        let mut cfg = Config::default();
        cfg.risk.extra_dangerous = vec![r"^terraform\s+destroy".to_string()];
        let classifier = to_risk_classifier(&cfg).unwrap();
        assert_eq!(
            classifier.classify("terraform destroy -auto-approve"),
            RiskTier::Dangerous
        );

        cfg.risk.extra_dangerous = vec!["(".to_string()];
        assert!(to_risk_classifier(&cfg).is_err());
    }

    #[test]
    fn test_log_config() {
        let mut cfg = Config::default();
        cfg.logging.format = "json".to_string();
        assert!(to_log_config(&cfg).is_ok());
        cfg.logging.format = "fancy".to_string();
        assert!(to_log_config(&cfg).is_err());
    }
}
