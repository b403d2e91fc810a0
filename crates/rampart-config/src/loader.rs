//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge the user config (`$RAMPART_HOME/config.toml` or `~/.rampart/config.toml`)
//! 3. Merge `{workspace}/.rampart/config.toml` + restriction enforcement
//! 4. Apply `RAMPART_*` environment overrides
//! 5. Deserialize the merged tree → `Config`
//! 6. Validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_overrides, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{
    ConfigLayer, FieldSources, deep_merge_tracking, enforce_restrictions, record_leaves,
};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A loaded configuration together with where each value came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final configuration.
    pub config: Config,
    /// Layer that set each leaf field, keyed by dotted path.
    pub field_sources: FieldSources,
    /// Config files that were found and merged, in order.
    pub loaded_files: Vec<String>,
}

impl ResolvedConfig {
    /// Layer that set `field` (dotted path), if known.
    #[must_use]
    pub fn source_of(&self, field: &str) -> Option<&ConfigLayer> {
        self.field_sources.get(field)
    }
}

/// Load the configuration from the standard locations and the process
/// environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed or the final
/// configuration fails validation.
pub fn load(
    workspace_root: Option<&Path>,
    rampart_home_override: Option<&Path>,
) -> ConfigResult<ResolvedConfig> {
    let env_vars = collect_env_vars();
    let user_dir = match rampart_home_override {
        Some(dir) => Some(dir.to_path_buf()),
        None => user_config_dir(&env_vars)?,
    };
    load_layers(workspace_root, user_dir.as_deref(), &env_vars)
}

/// Load with explicit inputs: `user_dir` is the directory holding the user
/// `config.toml` (skipped when `None`) and `env_vars` replaces the process
/// environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, an environment
/// override is invalid, or the final configuration fails validation.
pub fn load_layers<S: ::std::hash::BuildHasher>(
    workspace_root: Option<&Path>,
    user_dir: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    // 1. Embedded defaults.
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    // 2. User config.
    if let Some(dir) = user_dir {
        let path = dir.join("config.toml");
        if let Some(overlay) = try_load_file(&path)? {
            deep_merge_tracking(
                &mut merged,
                &overlay,
                "",
                &ConfigLayer::User,
                &mut field_sources,
            );
            loaded_files.push(path.display().to_string());
            info!(path = %path.display(), "loaded user config");
        }
    }

    // 3. Workspace config, which may only tighten.
    if let Some(ws_root) = workspace_root {
        let path = ws_root.join(".rampart").join("config.toml");
        if let Some(overlay) = try_load_file(&path)? {
            let baseline = merged.clone();
            deep_merge_tracking(
                &mut merged,
                &overlay,
                "",
                &ConfigLayer::Workspace,
                &mut field_sources,
            );
            enforce_restrictions(&mut merged, &baseline, &overlay);
            loaded_files.push(path.display().to_string());
            info!(path = %path.display(), "loaded workspace config");
        }
    }

    // 4. Environment overrides.
    let env_count = apply_env_overrides(&mut merged, &mut field_sources, env_vars)?;
    if env_count > 0 {
        debug!(count = env_count, "applied environment overrides");
    }

    // 5. Deserialize.
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    // 6. Validate.
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a config from a single file over the embedded defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;
    from_overlay(&overlay, &path.display().to_string())
}

/// Parse a TOML string over the embedded defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the string does not parse or fails
/// validation.
pub fn parse_str(content: &str) -> ConfigResult<Config> {
    let overlay: toml::Value = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: "<string>".to_owned(),
        source: e,
    })?;
    from_overlay(&overlay, "<string>")
}

fn from_overlay(overlay: &toml::Value, origin: &str) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    crate::merge::deep_merge(&mut merged, overlay);
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: origin.to_owned(),
                source: e,
            })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if it doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

/// `$RAMPART_HOME` when set, otherwise `~/.rampart`.
fn user_config_dir<S: ::std::hash::BuildHasher>(
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<Option<PathBuf>> {
    if let Some(home) = env_vars.get("RAMPART_HOME") {
        let path = PathBuf::from(home);
        if path.is_dir() {
            return Ok(Some(path));
        }
        tracing::warn!(path = %home, "RAMPART_HOME is not a directory; ignoring");
    }
    let base = directories::BaseDirs::new().ok_or(ConfigError::NoHomeDir)?;
    Ok(Some(base.home_dir().join(".rampart")))
}
