//! Executor settings and per-call options.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{ExecError, ExecResult};

/// Default per-command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default cap on captured bytes per stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Default number of results kept in history.
pub const DEFAULT_HISTORY_SIZE: usize = 200;

/// Executor-wide settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Shell used to run command strings (`<shell> -c <command>`).
    pub shell: String,
    /// Timeout when a call does not set one.
    pub default_timeout: Duration,
    /// Cap on captured bytes per stream.
    pub max_output_bytes: usize,
    /// Number of results kept in history.
    pub history_size: usize,
    /// JSONL file the history is persisted to, if any.
    pub history_path: Option<PathBuf>,
    /// Working directory when a call does not set one.
    pub working_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            default_timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            history_size: DEFAULT_HISTORY_SIZE,
            history_path: None,
            working_dir: None,
        }
    }
}

impl ExecutorConfig {
    /// Set the default working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Persist history to a JSONL file.
    #[must_use]
    pub fn with_history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = Some(path.into());
        self
    }

    /// Set the history capacity.
    #[must_use]
    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history_size = size;
        self
    }

    /// Set the default timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the output cap per stream.
    #[must_use]
    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Reject unusable settings.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::InvalidConfig`] for an empty shell, a zero
    /// timeout or a zero history size.
    pub fn validate(&self) -> ExecResult<()> {
        if self.shell.trim().is_empty() {
            return Err(ExecError::InvalidConfig("shell is empty".to_string()));
        }
        if self.default_timeout.is_zero() {
            return Err(ExecError::InvalidConfig(
                "default timeout must be positive".to_string(),
            ));
        }
        if self.history_size == 0 {
            return Err(ExecError::InvalidConfig(
                "history size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Options for one execution.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Timeout; the executor default when unset.
    pub timeout: Option<Duration>,
    /// Working directory; the executor default when unset.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
    /// External cancellation.
    pub cancel: Option<CancellationToken>,
    /// Let a DANGEROUS command reach the approval handler instead of being
    /// blocked outright.
    pub dangerous_override: bool,
    /// Description recorded on the operation.
    pub description: Option<String>,
}

impl ExecOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the timeout in whole seconds.
    #[must_use]
    pub fn with_timeout_secs(self, secs: u64) -> Self {
        self.with_timeout(Duration::from_secs(secs))
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Allow a DANGEROUS command to be put to the approval handler.
    #[must_use]
    pub fn with_dangerous_override(mut self) -> Self {
        self.dangerous_override = true;
        self
    }

    /// Describe the command for approval prompts.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
