//! Command execution and error recovery entry points.

use rampart_core::{CommandResult, ErrorContext, FixSuggestion, LearnedPattern};
use rampart_exec::{ExecOptions, OutputCallback, RetryAdvisor, RetryOutcome};
use rampart_recovery::{FixResult, RecoveryReport};
use std::path::Path;
use tracing::Instrument;

use super::Engine;
use crate::error::EngineResult;

impl Engine {
    /// Approve and run a command.
    ///
    /// Never fails: blocked, failing, timed-out and cancelled runs are
    /// reported in the result status. Failures carry an analysis.
    pub async fn execute_command(
        &self,
        command: &str,
        options: &ExecOptions,
        on_output: Option<OutputCallback<'_>>,
    ) -> CommandResult {
        let context = self.context("executor", "execute");
        self.executor
            .execute(command, options, on_output)
            .instrument(context.span())
            .await
    }

    /// Run a command, retrying failures with the configured backoff.
    ///
    /// Each failure goes to the recovery engine first. A HIGH-confidence
    /// automatic fix it applies shapes the next attempt and consumes one
    /// retry.
    pub async fn execute_with_retry(&self, command: &str, options: &ExecOptions) -> RetryOutcome {
        let context = self.context("executor", "execute_with_retry");
        let advisor: &dyn RetryAdvisor = self.recovery.as_ref();
        let outcome = self
            .executor
            .execute_with_retry(command, options, &self.retry, Some(advisor))
            .instrument(context.span())
            .await;
        tracing::debug!(
            command,
            attempts = outcome.attempts,
            fixes = outcome.fixes_applied.len(),
            status = %outcome.result.status,
            "Retry loop finished"
        );
        outcome
    }

    /// Classify raw error text.
    #[must_use]
    pub fn analyze_error(&self, raw: &str, source: Option<&Path>) -> ErrorContext {
        self.recovery.analyze(raw, source)
    }

    /// Ranked fix suggestions for `context`, HIGH first.
    #[must_use]
    pub fn suggest_fixes(&self, context: &ErrorContext) -> Vec<FixSuggestion> {
        self.recovery.suggest_fixes(context)
    }

    /// Apply one suggestion and learn from the outcome.
    ///
    /// File edits are backed up through the ledger first, so
    /// [`rollback`](Self::rollback) undoes them.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot record the decision or the undo
    /// point. A fix that does not work is a failed [`FixResult`].
    pub async fn apply_fix(
        &self,
        context: &ErrorContext,
        suggestion: &FixSuggestion,
    ) -> EngineResult<FixResult> {
        let span = self
            .context("recovery", "apply_fix")
            .with_metadata("kind", context.kind.to_string())
            .span();
        Ok(self
            .recovery
            .apply_fix(context, suggestion)
            .instrument(span)
            .await?)
    }

    /// Resolve an error without a human: apply the best automatic fix or
    /// fall back to manual handling.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger fails while applying a file fix.
    pub async fn recover(&self, context: ErrorContext) -> EngineResult<RecoveryReport> {
        let span = self.context("recovery", "recover").span();
        Ok(self.recovery.recover(context).instrument(span).await?)
    }

    /// Record the outcome of a fix applied outside the engine.
    pub fn record_outcome(
        &self,
        context: &ErrorContext,
        suggestion: &FixSuggestion,
        succeeded: bool,
    ) -> LearnedPattern {
        self.recovery.record_outcome(context, suggestion, succeeded)
    }
}
