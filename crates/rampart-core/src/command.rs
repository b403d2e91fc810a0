//! Command execution outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::diagnosis::ErrorContext;
use crate::types::{RiskTier, Timestamp};

/// Final status of a command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Exited with status zero.
    Success,
    /// Exited with a non-zero status.
    Failure,
    /// Killed after exceeding its timeout.
    Timeout,
    /// Never spawned: approval was not granted.
    Blocked,
    /// Killed by an external cancellation request.
    Cancelled,
    /// The process could not be started.
    SpawnFailed,
}

impl ExecutionStatus {
    /// Whether a retry may help.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Failure)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
            Self::SpawnFailed => "spawn_failed",
        };
        f.write_str(s)
    }
}

/// Immutable outcome of running a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// The command string as executed.
    pub command: String,
    /// Final status.
    pub status: ExecutionStatus,
    /// Process exit code, when the process exited normally.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether either stream hit the output cap.
    #[serde(default)]
    pub truncated: bool,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Risk tier at execution time.
    pub risk: RiskTier,
    /// Why the command was blocked, quoting the matched rule when there is one.
    #[serde(default)]
    pub blocked_reason: Option<String>,
    /// Structured analysis of the failure, when one was produced.
    #[serde(default)]
    pub analysis: Option<ErrorContext>,
    /// When the execution finished.
    pub timestamp: Timestamp,
}

impl CommandResult {
    /// A result for a command that was never spawned.
    #[must_use]
    pub fn blocked(command: impl Into<String>, risk: RiskTier, reason: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: ExecutionStatus::Blocked,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            duration_ms: 0,
            risk,
            blocked_reason: Some(reason.into()),
            analysis: None,
            timestamp: Timestamp::now(),
        }
    }

    /// Whether the command succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Wall-clock duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// The text most likely to describe a failure: stderr, or stdout when
    /// stderr is empty.
    #[must_use]
    pub fn failure_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }

    /// Attach an error analysis.
    #[must_use]
    pub fn with_analysis(mut self, analysis: ErrorContext) -> Self {
        self.analysis = Some(analysis);
        self
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` -> {}", self.command, self.status)?;
        if let Some(code) = self.exit_code {
            write!(f, " (exit {code})")?;
        }
        if let Some(reason) = &self.blocked_reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}
