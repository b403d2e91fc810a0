//! Deep merge of TOML values with restriction enforcement.
//!
//! The merge operates on raw [`toml::Value`] trees rather than deserialized
//! structs, so a key missing from an overlay never overrides the base layer.

mod deep;
mod path;
mod restrict;

pub use deep::{deep_merge, deep_merge_tracking};
pub(crate) use deep::record_leaves;
pub(crate) use path::set_nested;
pub use restrict::enforce_restrictions;

use std::collections::HashMap;

/// Which configuration layer a value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Compiled-in defaults (`defaults.toml`).
    Defaults,
    /// User-level configuration (`~/.rampart/config.toml`).
    User,
    /// Workspace-level configuration (`{workspace}/.rampart/config.toml`).
    Workspace,
    /// Environment variable.
    Environment,
}

impl std::fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::User => write!(f, "user (~/.rampart/config.toml)"),
            Self::Workspace => write!(f, "workspace (.rampart/config.toml)"),
            Self::Environment => write!(f, "environment variable"),
        }
    }
}

/// Tracks which layer set each field's value.
pub type FieldSources = HashMap<String, ConfigLayer>;
