//! Post-merge configuration validation.

use regex::Regex;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_approval(config)?;
    validate_risk(config)?;
    validate_undo(config)?;
    validate_executor(config)?;
    validate_recovery(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_approval(config: &Config) -> ConfigResult<()> {
    if config.approval.timeout_secs == Some(0) {
        return Err(invalid(
            "approval.timeout_secs",
            "timeout must be positive; omit it to wait indefinitely",
        ));
    }
    Ok(())
}

fn validate_risk(config: &Config) -> ConfigResult<()> {
    for (field, patterns) in [
        ("risk.extra_dangerous", &config.risk.extra_dangerous),
        ("risk.extra_safe", &config.risk.extra_safe),
    ] {
        for pattern in patterns {
            if let Err(e) = Regex::new(pattern) {
                return Err(invalid(field, format!("invalid regex '{pattern}': {e}")));
            }
        }
    }
    Ok(())
}

fn validate_undo(config: &Config) -> ConfigResult<()> {
    if config.undo.max_points == 0 {
        return Err(invalid("undo.max_points", "must be at least 1"));
    }
    Ok(())
}

fn validate_executor(config: &Config) -> ConfigResult<()> {
    let e = &config.executor;
    if e.shell.trim().is_empty() {
        return Err(invalid("executor.shell", "shell must not be empty"));
    }
    if e.default_timeout_secs == 0 {
        return Err(invalid("executor.default_timeout_secs", "must be positive"));
    }
    if e.history_size == 0 {
        return Err(invalid("executor.history_size", "must be at least 1"));
    }
    if e.max_output_bytes == 0 {
        return Err(invalid("executor.max_output_bytes", "must be positive"));
    }
    if !e.retry.exponential_base.is_finite() || e.retry.exponential_base < 1.0 {
        return Err(invalid(
            "executor.retry.exponential_base",
            "must be a finite number >= 1.0",
        ));
    }
    if e.retry.initial_delay_ms > e.retry.max_delay_ms {
        return Err(invalid(
            "executor.retry.initial_delay_ms",
            "initial delay exceeds max_delay_ms",
        ));
    }
    Ok(())
}

fn validate_recovery(config: &Config) -> ConfigResult<()> {
    let r = &config.recovery;
    if !(r.smoothing_factor > 0.0 && r.smoothing_factor <= 1.0) {
        return Err(invalid(
            "recovery.smoothing_factor",
            format!("{} is outside (0, 1]", r.smoothing_factor),
        ));
    }
    for (field, value) in [
        ("recovery.learned_min_rate", r.learned_min_rate),
        ("recovery.min_confidence", r.min_confidence),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid(field, format!("{value} is outside [0, 1]")));
        }
    }
    if r.fix_timeout_secs == 0 {
        return Err(invalid("recovery.fix_timeout_secs", "must be positive"));
    }
    if r.flush_every == 0 {
        return Err(invalid("recovery.flush_every", "must be at least 1"));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(
        l.level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "logging.level",
            format!("unknown level '{}'", l.level),
        ));
    }
    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected pretty, compact, json or full",
                l.format
            ),
        ));
    }
    Ok(())
}
