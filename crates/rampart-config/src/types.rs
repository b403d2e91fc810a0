//! Configuration types for Rampart.
//!
//! Types here have no dependencies on other rampart crates; the runtime
//! converts them into component configs at startup. Every struct implements
//! [`Default`] matching `defaults.toml` so that a bare `[section]` header
//! produces a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Approval ledger behaviour.
    pub approval: ApprovalSection,
    /// Extra risk classification rules.
    pub risk: RiskSection,
    /// Undo history limits.
    pub undo: UndoSection,
    /// Command executor settings.
    pub executor: ExecutorSection,
    /// Error recovery and learning.
    pub recovery: RecoverySection,
    /// Where persistent state lives.
    pub storage: StorageSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// ApprovalSection
// ---------------------------------------------------------------------------

/// Approval ledger behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSection {
    /// Approve SAFE operations without asking.
    pub auto_approve_safe: bool,
    /// Give up on the approval handler after this many seconds and defer.
    /// Unset waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for ApprovalSection {
    fn default() -> Self {
        Self {
            auto_approve_safe: true,
            timeout_secs: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RiskSection
// ---------------------------------------------------------------------------

/// Additional classifier rules, as regular expressions over a command segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    /// Patterns that make a command DANGEROUS.
    pub extra_dangerous: Vec<String>,
    /// Patterns that make a command SAFE. Never overrides a dangerous match.
    pub extra_safe: Vec<String>,
}

// ---------------------------------------------------------------------------
// UndoSection
// ---------------------------------------------------------------------------

/// Undo history limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoSection {
    /// Maximum retained undo points; the oldest are pruned first.
    pub max_points: usize,
}

impl Default for UndoSection {
    fn default() -> Self {
        Self { max_points: 50 }
    }
}

// ---------------------------------------------------------------------------
// ExecutorSection
// ---------------------------------------------------------------------------

/// Command executor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Shell used to run command strings (`{shell} -c {command}`).
    pub shell: String,
    /// Timeout applied when the caller gives none.
    pub default_timeout_secs: u64,
    /// Capacity of the execution history ring buffer.
    pub history_size: usize,
    /// Per-stream capture cap in bytes.
    pub max_output_bytes: usize,
    /// Persist history to `history.jsonl` under the state directory.
    pub persist_history: bool,
    /// Retry schedule for `execute_with_retry`.
    pub retry: RetrySection,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            shell: "sh".to_owned(),
            default_timeout_secs: 120,
            history_size: 200,
            max_output_bytes: 1_048_576,
            persist_history: true,
            retry: RetrySection::default(),
        }
    }
}

/// Exponential backoff schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Cap on the delay.
    pub max_delay_ms: u64,
    /// Growth factor per retry.
    pub exponential_base: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            exponential_base: 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// RecoverySection
// ---------------------------------------------------------------------------

/// Error recovery and learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySection {
    /// EMA smoothing factor α in `(0, 1]`.
    pub smoothing_factor: f64,
    /// Success rate a learned pattern needs to be surfaced as HIGH.
    pub learned_min_rate: f64,
    /// Uses a learned pattern needs to be surfaced as HIGH.
    pub learned_min_uses: u32,
    /// Timeout for fix commands.
    pub fix_timeout_secs: u64,
    /// Confidence floor below which the assistant falls back to manual mode.
    pub min_confidence: f64,
    /// Let `execute_with_retry` apply HIGH-confidence fixes without asking.
    pub auto_apply_high: bool,
    /// Flush the learned-pattern store after this many updates.
    pub flush_every: u32,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.3,
            learned_min_rate: 0.9,
            learned_min_uses: 3,
            fix_timeout_secs: 120,
            min_confidence: 0.6,
            auto_apply_high: true,
            flush_every: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// StorageSection
// ---------------------------------------------------------------------------

/// Where persistent state lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// State directory. Defaults to `{workspace}/.rampart/state`.
    pub state_dir: Option<PathBuf>,
}

impl StorageSection {
    /// Resolve the state directory for a workspace.
    #[must_use]
    pub fn resolve_state_dir(&self, workspace_root: &Path) -> PathBuf {
        match &self.state_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => workspace_root.join(dir),
            None => workspace_root.join(".rampart").join("state"),
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global level (`"trace"`, `"debug"`, `"info"`, `"warn"`, `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate directives (e.g. `["rampart_exec=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
