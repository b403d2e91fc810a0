//! Retrying failed commands with backoff and automatic fixes.

use async_trait::async_trait;
use rampart_core::{CommandResult, RetryConfig};
use std::collections::BTreeMap;

use crate::config::ExecOptions;
use crate::executor::{CommandExecutor, cancelled};

/// A fix that was applied between two attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedFix {
    /// What was done.
    pub description: String,
    /// Command to run on the next attempt instead of the failed one.
    pub replacement_command: Option<String>,
    /// Environment variables to add on the next attempt.
    pub env: BTreeMap<String, String>,
}

impl AppliedFix {
    /// A fix that changed state outside the command (a file edit, an
    /// installed package).
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            replacement_command: None,
            env: BTreeMap::new(),
        }
    }

    /// Run `command` on the next attempt.
    #[must_use]
    pub fn with_replacement(mut self, command: impl Into<String>) -> Self {
        self.replacement_command = Some(command.into());
        self
    }

    /// Set an environment variable on the next attempt.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Consulted after every retryable failure.
///
/// Returns the fix it applied, or `None` to retry unchanged. Implementations
/// only report fixes that were applied successfully.
#[async_trait]
pub trait RetryAdvisor: Send + Sync {
    /// React to a failed attempt of `command`.
    async fn on_failure(&self, command: &str, result: &CommandResult) -> Option<AppliedFix>;

    /// Result of the attempt that followed `fix`.
    async fn after_fix(&self, _fix: &AppliedFix, _result: &CommandResult) {}

    /// The loop stopped before the attempt that would have followed `fix`.
    async fn abandon_fix(&self, _fix: &AppliedFix) {}
}

/// Result of [`CommandExecutor::execute_with_retry`].
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    /// Result of the last attempt.
    pub result: CommandResult,
    /// Number of attempts made, the first one included.
    pub attempts: u32,
    /// Fixes applied between attempts, in order.
    pub fixes_applied: Vec<AppliedFix>,
    /// Command run on each attempt, in order.
    pub commands_tried: Vec<String>,
}

impl RetryOutcome {
    /// Whether the last attempt succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result.is_success()
    }
}

impl CommandExecutor {
    /// Run `command`, retrying plain failures with exponential backoff.
    ///
    /// Only [`ExecutionStatus::Failure`](rampart_core::ExecutionStatus::Failure)
    /// is retried. Each failure goes to `advisor` first; a fix it applied
    /// changes the command or environment of the next attempt. An applied
    /// fix still consumes one of `retry.max_retries`. Cancelling
    /// `options.cancel` during a backoff stops the loop with the last
    /// result.
    pub async fn execute_with_retry(
        &self,
        command: &str,
        options: &ExecOptions,
        retry: &RetryConfig,
        advisor: Option<&dyn RetryAdvisor>,
    ) -> RetryOutcome {
        let mut current = command.to_string();
        let mut options = options.clone();
        let mut fixes_applied = Vec::new();
        let mut commands_tried = Vec::new();
        let mut retries_used: u32 = 0;

        let mut fixed_before_attempt = false;

        loop {
            commands_tried.push(current.clone());
            let result = self.execute(&current, &options, None).await;
            let attempts = retries_used.saturating_add(1);
            if fixed_before_attempt
                && let (Some(advisor), Some(fix)) = (advisor, fixes_applied.last())
            {
                advisor.after_fix(fix, &result).await;
            }
            fixed_before_attempt = false;

            if !result.status.is_retryable() || !retry.allows_retry(retries_used) {
                if !result.is_success() {
                    tracing::warn!(
                        command = %current,
                        status = %result.status,
                        attempts,
                        "Giving up on command"
                    );
                }
                return RetryOutcome {
                    result,
                    attempts,
                    fixes_applied,
                    commands_tried,
                };
            }

            if let Some(advisor) = advisor
                && let Some(fix) = advisor.on_failure(&current, &result).await
            {
                tracing::info!(
                    command = %current,
                    fix = %fix.description,
                    replacement = ?fix.replacement_command,
                    "Applied fix before retry"
                );
                if let Some(replacement) = &fix.replacement_command {
                    current.clone_from(replacement);
                }
                options
                    .env
                    .extend(fix.env.iter().map(|(k, v)| (k.clone(), v.clone())));
                fixes_applied.push(fix);
                fixed_before_attempt = true;
            }

            retries_used = retries_used.saturating_add(1);
            let delay = retry.jittered_delay(retries_used, rand::random::<f64>());
            tracing::debug!(command = %current, retry = retries_used, ?delay, "Retrying command");

            tokio::select! {
                () = tokio::time::sleep(delay) => {},
                () = cancelled(options.cancel.as_ref()) => {
                    tracing::info!(command = %current, "Retry cancelled during backoff");
                    if fixed_before_attempt
                        && let (Some(advisor), Some(fix)) = (advisor, fixes_applied.last())
                    {
                        advisor.abandon_fix(fix).await;
                    }
                    return RetryOutcome {
                        result,
                        attempts,
                        fixes_applied,
                        commands_tried,
                    };
                },
            }
        }
    }
}
