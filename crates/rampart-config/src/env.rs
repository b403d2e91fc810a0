//! Environment variable overrides.
//!
//! Environment variables are the last layer: they override every file layer.
//! Only the `RAMPART_*` variables listed here are consulted.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, set_nested};

/// Kind of value an environment variable carries.
#[derive(Clone, Copy)]
enum EnvKind {
    Str,
    Bool,
}

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static [&'static str],
    kind: EnvKind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "RAMPART_LOG",
        field_path: &["logging", "level"],
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "RAMPART_STATE_DIR",
        field_path: &["storage", "state_dir"],
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "RAMPART_AUTO_APPROVE",
        field_path: &["approval", "auto_approve_safe"],
        kind: EnvKind::Bool,
    },
];

/// Collect the `RAMPART_*` variables from the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("RAMPART_"))
        .collect()
}

/// Apply environment overrides. Returns the number applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a boolean variable is not a
/// recognizable boolean.
pub fn apply_env_overrides<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };
        let value = match mapping.kind {
            EnvKind::Str => toml::Value::String(raw.clone()),
            EnvKind::Bool => toml::Value::Boolean(parse_bool(raw).ok_or_else(|| {
                ConfigError::EnvError {
                    var_name: mapping.var_name.to_owned(),
                    message: format!("expected a boolean, got '{raw}'"),
                }
            })?),
        };
        debug!(var = mapping.var_name, "applying environment override");
        set_nested(merged, mapping.field_path, value);
        sources.insert(mapping.field_path.join("."), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }

    Ok(count)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> toml::Value {
        toml::from_str("[approval]\nauto_approve_safe = true\n[logging]\nlevel = \"info\"\n")
            .unwrap()
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut merged = defaults();
        let mut sources = FieldSources::new();
        let env: HashMap<String, String> = [
            ("RAMPART_LOG".to_owned(), "debug".to_owned()),
            ("RAMPART_AUTO_APPROVE".to_owned(), "off".to_owned()),
            ("RAMPART_STATE_DIR".to_owned(), "/tmp/state".to_owned()),
        ]
        .into_iter()
        .collect();

        let n = apply_env_overrides(&mut merged, &mut sources, &env).unwrap();
        assert_eq!(n, 3);
        assert_eq!(merged["logging"]["level"].as_str(), Some("debug"));
        assert_eq!(merged["approval"]["auto_approve_safe"].as_bool(), Some(false));
        assert_eq!(merged["storage"]["state_dir"].as_str(), Some("/tmp/state"));
        assert_eq!(
            sources.get("logging.level"),
            Some(&ConfigLayer::Environment)
        );
    }

    #[test]
    fn test_bad_bool_is_error() {
        let mut merged = defaults();
        let env: HashMap<String, String> =
            [("RAMPART_AUTO_APPROVE".to_owned(), "maybe".to_owned())]
                .into_iter()
                .collect();
        let err = apply_env_overrides(&mut merged, &mut FieldSources::new(), &env).unwrap_err();
        assert!(matches!(err, ConfigError::EnvError { .. }));
    }
}
