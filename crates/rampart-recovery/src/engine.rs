//! The recovery engine: analyze, suggest, apply, learn.

use async_trait::async_trait;
use rampart_core::{
    CommandResult, ConfidenceTier, ErrorContext, ErrorKind, ExecutionStatus, FixKind,
    FixPayload, FixSuggestion, LearnedPattern, Operation, SuggestionSource, UndoPointId,
};
use rampart_exec::{AppliedFix, CommandExecutor, ExecOptions, RetryAdvisor};
use rampart_storage::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::analyzer::{ErrorAnalyzer, error_signature};
use crate::error::RecoveryResult;
use crate::learned::LearnedStore;
use crate::rules::{COMMAND_LINE_DETAIL, rule_suggestions, set_config_key};
use crate::settings::{DEMOTE_BELOW_RATE, RecoverySettings};
use crate::state::{RecoveryState, RecoveryTracker};

/// What happened when a fix was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FixOutcome {
    /// The fix ran and succeeded.
    Applied,
    /// The fix ran and failed.
    Failed {
        /// Why.
        reason: String,
    },
    /// The ledger did not approve the fix.
    Declined {
        /// The ledger's explanation.
        reason: String,
    },
    /// The fix cannot be applied automatically.
    NotApplicable {
        /// Why.
        reason: String,
    },
}

impl FixOutcome {
    /// Whether the fix was applied successfully.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Whether the outcome says something about the fix itself, and so
    /// belongs in the learned store.
    #[must_use]
    pub fn is_learnable(&self) -> bool {
        matches!(self, Self::Applied | Self::Failed { .. })
    }
}

impl fmt::Display for FixOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Declined { reason } => write!(f, "declined: {reason}"),
            Self::NotApplicable { reason } => write!(f, "not applicable: {reason}"),
        }
    }
}

/// A fix attempt and everything it produced.
#[derive(Debug, Clone)]
pub struct FixResult {
    /// The suggestion that was attempted.
    pub suggestion: FixSuggestion,
    /// What happened.
    pub outcome: FixOutcome,
    /// Undo point covering a file edit, for rollback.
    pub undo_point: Option<UndoPointId>,
    /// Result of a fix command.
    pub command_result: Option<CommandResult>,
}

impl FixResult {
    fn new(suggestion: &FixSuggestion, outcome: FixOutcome) -> Self {
        Self {
            suggestion: suggestion.clone(),
            outcome,
            undo_point: None,
            command_result: None,
        }
    }

    /// Whether the fix was applied successfully.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.outcome.is_applied()
    }
}

/// One error occurrence from analysis to its terminal state.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    /// The analyzed error.
    pub context: ErrorContext,
    /// Ranked suggestions, HIGH first.
    pub suggestions: Vec<FixSuggestion>,
    /// The fix that was attempted, if any.
    pub applied: Option<FixResult>,
    /// Every state visited, starting with `Raised`.
    pub states: Vec<RecoveryState>,
}

impl RecoveryReport {
    /// Where the occurrence ended.
    #[must_use]
    pub fn final_state(&self) -> RecoveryState {
        self.states
            .last()
            .copied()
            .unwrap_or(RecoveryState::Raised)
    }

    /// Whether a fix resolved the error.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.final_state() == RecoveryState::Resolved
    }
}

/// Move `tracker` to the terminal state matching `result`.
pub(crate) fn conclude(tracker: &mut RecoveryTracker, result: &FixResult) -> RecoveryResult<()> {
    match result.outcome {
        FixOutcome::Applied => {
            tracker.advance(RecoveryState::FixApplied)?;
            tracker.advance(RecoveryState::Resolved)
        },
        FixOutcome::Failed { .. } => {
            tracker.advance(RecoveryState::FixApplied)?;
            tracker.advance(RecoveryState::Failed)
        },
        FixOutcome::Declined { .. } | FixOutcome::NotApplicable { .. } => {
            tracker.advance(RecoveryState::ManualFallback)
        },
    }
}

/// Analyzes failures, ranks fixes and applies them through the ledger and
/// executor, learning from every outcome.
pub struct RecoveryEngine {
    executor: Arc<CommandExecutor>,
    analyzer: ErrorAnalyzer,
    store: LearnedStore,
    settings: RecoverySettings,
    /// Replacement command -> (error signature, suggestion) awaiting the
    /// outcome of the retry that runs it.
    pending: Mutex<HashMap<String, (String, FixSuggestion)>>,
}

impl RecoveryEngine {
    /// Create an engine. Relative paths in error text resolve against the
    /// ledger's workspace root.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::InvalidSettings`](crate::RecoveryError::InvalidSettings)
    /// for out-of-range settings.
    pub fn new(
        executor: Arc<CommandExecutor>,
        store: LearnedStore,
        settings: RecoverySettings,
    ) -> RecoveryResult<Self> {
        settings.validate()?;
        let analyzer = ErrorAnalyzer::new().with_base_dir(executor.ledger().workspace_root());
        Ok(Self {
            executor,
            analyzer,
            store,
            settings,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// The executor fix commands run through.
    #[must_use]
    pub fn executor(&self) -> &Arc<CommandExecutor> {
        &self.executor
    }

    /// The learned-pattern store.
    #[must_use]
    pub fn store(&self) -> &LearnedStore {
        &self.store
    }

    /// Engine settings.
    #[must_use]
    pub fn settings(&self) -> &RecoverySettings {
        &self.settings
    }

    /// The analyzer used by [`analyze`](Self::analyze).
    #[must_use]
    pub fn analyzer(&self) -> &ErrorAnalyzer {
        &self.analyzer
    }

    /// Classify raw error text.
    #[must_use]
    pub fn analyze(&self, raw: &str, source: Option<&Path>) -> ErrorContext {
        self.analyzer.analyze(raw, source)
    }

    /// Analysis of a failed command, reusing the executor's annotation when
    /// present. The command line is kept as a detail so fixes can rewrite
    /// it.
    #[must_use]
    pub fn analyze_result(&self, result: &CommandResult) -> ErrorContext {
        result
            .analysis
            .clone()
            .unwrap_or_else(|| self.analyzer.analyze(result.failure_text(), None))
            .with_detail(COMMAND_LINE_DETAIL, result.command.clone())
    }

    /// Ranked fixes for `context`, HIGH first.
    ///
    /// Learned patterns that qualify come first and surface as HIGH. Rule
    /// suggestions follow, minus any the learned ones already cover; a rule
    /// whose track record for this error is poor is demoted to its learned
    /// rate.
    #[must_use]
    pub fn suggest_fixes(&self, context: &ErrorContext) -> Vec<FixSuggestion> {
        let signature = error_signature(context);
        let min_uses = self.settings.learned_min_uses;
        let mut seen = HashSet::new();
        let mut suggestions = Vec::new();

        for pattern in self
            .store
            .qualifying(&signature, self.settings.learned_min_rate, min_uses)
        {
            if seen.insert(pattern.fix_signature.clone()) {
                let mut suggestion = pattern.suggestion.learned();
                suggestion.confidence = pattern.success_rate.max(ConfidenceTier::HIGH);
                suggestions.push(suggestion);
            }
        }

        let history = self.store.patterns_for(&signature);
        let workspace = self.executor.ledger().workspace_root();
        for mut suggestion in rule_suggestions(context, workspace) {
            let fix = suggestion.fix_signature();
            if !seen.insert(fix.clone()) {
                continue;
            }
            if let Some(poor) = history.iter().find(|p| {
                p.fix_signature == fix && p.uses >= min_uses && p.success_rate < DEMOTE_BELOW_RATE
            }) {
                tracing::debug!(
                    %fix,
                    rate = poor.success_rate,
                    uses = poor.uses,
                    "Demoting rule with a poor track record"
                );
                suggestion.confidence = poor.success_rate;
            }
            suggestions.push(suggestion);
        }

        suggestions.sort_by(|a, b| {
            b.tier()
                .cmp(&a.tier())
                .then_with(|| {
                    let learned = |s: &FixSuggestion| s.source == SuggestionSource::Learned;
                    learned(b).cmp(&learned(a))
                })
                .then_with(|| b.confidence.total_cmp(&a.confidence))
        });
        tracing::debug!(
            kind = %context.kind,
            %signature,
            count = suggestions.len(),
            "Suggested fixes"
        );
        suggestions
    }

    /// Apply `suggestion` once and record the outcome.
    ///
    /// Commands run through the executor with the fix timeout, so they are
    /// approved like any other command. File edits are approved by the
    /// ledger and backed up in an undo point before the write. A failed fix
    /// is reported, never retried.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot record the decision or the undo
    /// point. Fix failures are [`FixOutcome`]s.
    pub async fn apply_fix(
        &self,
        context: &ErrorContext,
        suggestion: &FixSuggestion,
    ) -> RecoveryResult<FixResult> {
        tracing::info!(
            kind = %context.kind,
            fix = %suggestion.description,
            confidence = suggestion.confidence,
            "Applying fix"
        );
        let result = match &suggestion.payload {
            FixPayload::Manual { hint } => FixResult::new(
                suggestion,
                FixOutcome::NotApplicable {
                    reason: hint.clone(),
                },
            ),
            FixPayload::RunCommand { command } => self.run_fix_command(suggestion, command).await,
            FixPayload::InstallPackage {
                command,
                package,
                manifest,
                ..
            } => {
                let result = self.run_fix_command(suggestion, command).await;
                if result.is_applied()
                    && let Some(manifest) = manifest
                {
                    self.record_in_manifest(manifest, package).await;
                }
                result
            },
            FixPayload::EditCode { path, edit } => {
                let path = self.executor.ledger().resolve(path);
                self.edit_file(suggestion, &path, false, |source| edit.apply(source))
                    .await?
            },
            FixPayload::EditConfig { path, key, value } => {
                let path = self.executor.ledger().resolve(path);
                self.edit_file(suggestion, &path, true, |source| {
                    Some(set_config_key(source, key, value))
                })
                .await?
            },
        };

        if result.outcome.is_learnable() {
            self.record_outcome(context, suggestion, result.is_applied());
        }
        match &result.outcome {
            FixOutcome::Applied => tracing::info!(fix = %suggestion.description, "Fix applied"),
            other => tracing::warn!(fix = %suggestion.description, outcome = %other, "Fix not applied"),
        }
        Ok(result)
    }

    async fn run_fix_command(&self, suggestion: &FixSuggestion, command: &str) -> FixResult {
        let options = ExecOptions::new()
            .with_timeout(self.settings.fix_timeout)
            .with_description(format!("fix: {}", suggestion.description));
        let result = self.executor.execute(command, &options, None).await;
        let outcome = match result.status {
            ExecutionStatus::Success => FixOutcome::Applied,
            ExecutionStatus::Blocked => FixOutcome::Declined {
                reason: result
                    .blocked_reason
                    .clone()
                    .unwrap_or_else(|| "blocked".to_string()),
            },
            status => {
                let detail = result
                    .failure_text()
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                FixOutcome::Failed {
                    reason: if detail.is_empty() {
                        format!("`{command}` {status}")
                    } else {
                        format!("`{command}` {status}: {detail}")
                    },
                }
            },
        };
        FixResult {
            command_result: Some(result),
            ..FixResult::new(suggestion, outcome)
        }
    }

    /// Rewrite `path` through the ledger: approval, backup, undo point,
    /// atomic write. A missing file is created only when `create` is set.
    async fn edit_file(
        &self,
        suggestion: &FixSuggestion,
        path: &Path,
        create: bool,
        transform: impl FnOnce(&str) -> Option<String>,
    ) -> RecoveryResult<FixResult> {
        let not_applicable = |reason: String| {
            Ok(FixResult::new(
                suggestion,
                FixOutcome::NotApplicable { reason },
            ))
        };
        let existing = match std::fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && create => None,
            Err(e) => return not_applicable(format!("cannot read {}: {e}", path.display())),
        };
        let Some(updated) = transform(existing.as_deref().unwrap_or_default()) else {
            return not_applicable(format!("edit does not apply to {}", path.display()));
        };
        if existing.as_deref() == Some(updated.as_str()) {
            return not_applicable(format!("{} already has the change", path.display()));
        }

        let target = path.to_string_lossy().into_owned();
        let mut operation = match &existing {
            Some(previous) => {
                Operation::file_modify(target, updated.clone()).read_from(previous.as_bytes())
            },
            None => Operation::file_create(target, updated.clone()),
        }
        .with_description(format!("fix: {}", suggestion.description));

        let ledger = self.executor.ledger();
        let approval = ledger.check_approval(&mut operation, &[]).await?;
        if !approval.is_approved() {
            return Ok(FixResult::new(
                suggestion,
                FixOutcome::Declined {
                    reason: approval.explain(),
                },
            ));
        }
        let snapshot = ledger
            .capture_snapshot(std::slice::from_ref(&operation))
            .await?;
        let point = ledger
            .create_undo_point(vec![operation], snapshot, suggestion.description.clone())
            .await?;

        let outcome = match write_atomic(path, updated.as_bytes()) {
            Ok(()) => FixOutcome::Applied,
            Err(e) => FixOutcome::Failed {
                reason: e.to_string(),
            },
        };
        Ok(FixResult {
            undo_point: Some(point.id),
            ..FixResult::new(suggestion, outcome)
        })
    }

    /// Add `package` to a requirements-style manifest after an install.
    async fn record_in_manifest(&self, manifest: &Path, package: &str) {
        let note = FixSuggestion::new(
            format!("Record {package} in {}", manifest.display()),
            FixKind::EditConfig,
            1.0,
            FixPayload::Manual {
                hint: String::new(),
            },
        );
        let append = |source: &str| {
            let listed = source.lines().any(|line| {
                line.split(['=', '<', '>', '~', '!', '[', ';', ' '])
                    .next()
                    .is_some_and(|name| name.eq_ignore_ascii_case(package))
            });
            if listed {
                return None;
            }
            let mut text = source.to_string();
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(package);
            text.push('\n');
            Some(text)
        };
        match self.edit_file(&note, manifest, false, append).await {
            Ok(result) if result.is_applied() => {
                tracing::info!(%package, manifest = %manifest.display(), "Recorded dependency");
            },
            Ok(result) => {
                tracing::debug!(%package, outcome = %result.outcome, "Manifest left unchanged");
            },
            Err(e) => {
                tracing::warn!(%package, error = %e, "Failed to record dependency");
            },
        }
    }

    /// Feed an outcome into the learned store.
    pub fn record_outcome(
        &self,
        context: &ErrorContext,
        suggestion: &FixSuggestion,
        succeeded: bool,
    ) -> LearnedPattern {
        self.store
            .record(&error_signature(context), suggestion, succeeded)
    }

    /// Resolve `context` without a human: apply the best HIGH suggestion
    /// that does not require approval, or fall back to manual handling.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger fails while applying a file fix.
    pub async fn recover(&self, context: ErrorContext) -> RecoveryResult<RecoveryReport> {
        let mut tracker = RecoveryTracker::new();
        tracker.advance(RecoveryState::Analyzed)?;
        let suggestions = self.suggest_fixes(&context);

        let Some(best) = suggestions.iter().find(|s| is_automatic(s)).cloned() else {
            tracker.advance(RecoveryState::ManualFallback)?;
            return Ok(RecoveryReport {
                context,
                suggestions,
                applied: None,
                states: tracker.into_visited(),
            });
        };
        tracker.advance(RecoveryState::FixSuggested)?;
        let result = self.apply_fix(&context, &best).await?;
        conclude(&mut tracker, &result)?;
        Ok(RecoveryReport {
            context,
            suggestions,
            applied: Some(result),
            states: tracker.into_visited(),
        })
    }

    /// Persist pending learned-pattern updates.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be written.
    pub fn flush(&self) -> RecoveryResult<()> {
        self.store.flush()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, FixSuggestion)>> {
        self.pending.lock().unwrap_or_else(|e| {
            tracing::warn!("RecoveryEngine pending lock poisoned, recovering");
            e.into_inner()
        })
    }
}

/// Whether a suggestion may be applied without asking anyone.
fn is_automatic(suggestion: &FixSuggestion) -> bool {
    suggestion.tier() == ConfidenceTier::High
        && suggestion.payload.is_actionable()
        && !suggestion.requires_approval
}

#[async_trait]
impl RetryAdvisor for RecoveryEngine {
    async fn on_failure(&self, command: &str, result: &CommandResult) -> Option<AppliedFix> {
        if !self.settings.auto_apply_high {
            return None;
        }
        let context = self.analyze_result(result);
        let fix = self
            .suggest_fixes(&context)
            .into_iter()
            .find(is_automatic)?;

        // A corrected command line replaces the next attempt instead of
        // running now; its outcome arrives through `after_fix`.
        if context.kind == ErrorKind::CommandNotFound
            && let FixPayload::RunCommand {
                command: replacement,
            } = &fix.payload
        {
            tracing::info!(%command, %replacement, "Retrying with corrected command");
            self.pending().insert(
                replacement.clone(),
                (error_signature(&context), fix.clone()),
            );
            return Some(AppliedFix::new(fix.description.clone()).with_replacement(replacement));
        }

        match self.apply_fix(&context, &fix).await {
            Ok(applied) if applied.is_applied() => Some(AppliedFix::new(fix.description)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(%command, error = %e, "Automatic fix failed");
                None
            },
        }
    }

    async fn after_fix(&self, fix: &AppliedFix, result: &CommandResult) {
        let Some(replacement) = &fix.replacement_command else {
            return;
        };
        let entry = self.pending().remove(replacement);
        if let Some((signature, suggestion)) = entry {
            self.store
                .record(&signature, &suggestion, result.is_success());
        }
    }

    async fn abandon_fix(&self, fix: &AppliedFix) {
        if let Some(replacement) = &fix.replacement_command
            && self.pending().remove(replacement).is_some()
        {
            tracing::debug!(%replacement, "Dropped corrected command that never ran");
        }
    }
}

impl fmt::Debug for RecoveryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryEngine")
            .field("store", &self.store)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rampart_approval::{
        ApprovalDecision, ApprovalHandler, ApprovalLedger, ApprovalRequest, ApprovalResponse,
        FilesOnlyRollback, LedgerOptions, RiskClassifier,
    };
    use rampart_core::{CodeEdit, RetryConfig};
    use rampart_exec::ExecutorConfig;

    struct ApproveAll;

    #[async_trait]
    impl ApprovalHandler for ApproveAll {
        async fn request_approval(&self, request: ApprovalRequest) -> Option<ApprovalResponse> {
            Some(ApprovalResponse::new(request.id, ApprovalDecision::Approve))
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    async fn engine(dir: &Path, approve: bool) -> RecoveryEngine {
        let ledger = ApprovalLedger::open(
            &dir.join(".state"),
            dir,
            RiskClassifier::new(),
            LedgerOptions::default(),
        )
        .unwrap();
        if approve {
            ledger.register_handler(Arc::new(ApproveAll)).await;
        }
        let executor = CommandExecutor::new(
            Arc::new(ledger),
            ExecutorConfig::default().with_working_dir(dir),
        )
        .unwrap();
        let settings = RecoverySettings::default();
        RecoveryEngine::new(
            Arc::new(executor),
            LearnedStore::in_memory(&settings),
            settings,
        )
        .unwrap()
    }

    fn command_fix(command: &str, confidence: f64) -> FixSuggestion {
        FixSuggestion::new(
            format!("run {command}"),
            FixKind::RunCommand,
            confidence,
            FixPayload::RunCommand {
                command: command.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_missing_module_suggests_install() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), false).await;
        let ctx = engine.analyze("ModuleNotFoundError: No module named 'requests'", None);
        assert_eq!(ctx.kind, ErrorKind::DependencyMissing);
        let fixes = engine.suggest_fixes(&ctx);
        let install = fixes
            .iter()
            .find(|s| s.kind == FixKind::RunCommand)
            .unwrap();
        assert!(install.tier() >= ConfidenceTier::Medium);
        assert!(install.payload.command().unwrap().contains("requests"));
    }

    #[tokio::test]
    async fn test_learned_pattern_ranks_first_as_high() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), false).await;
        let ctx = engine.analyze("ModuleNotFoundError: No module named 'requests'", None);
        let learned = command_fix("pip install requests==2.31", 0.4);
        for _ in 0..3 {
            engine.record_outcome(&ctx, &learned, true);
        }
        let fixes = engine.suggest_fixes(&ctx);
        assert_eq!(fixes[0].payload.command(), Some("pip install requests==2.31"));
        assert_eq!(fixes[0].tier(), ConfidenceTier::High);
        assert_eq!(fixes[0].source, SuggestionSource::Learned);
        assert!(fixes.len() >= 2);
    }

    #[tokio::test]
    async fn test_learned_and_rule_fix_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), false).await;
        let ctx = engine.analyze("ModuleNotFoundError: No module named 'requests'", None);
        let rule = engine.suggest_fixes(&ctx).remove(0);
        for _ in 0..3 {
            engine.record_outcome(&ctx, &rule, true);
        }
        let fixes = engine.suggest_fixes(&ctx);
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].source, SuggestionSource::Learned);
    }

    #[tokio::test]
    async fn test_poor_track_record_demotes_rule() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), false).await;
        let ctx = engine.analyze("ModuleNotFoundError: No module named 'requests'", None);
        let rule = engine.suggest_fixes(&ctx).remove(0);
        for _ in 0..3 {
            engine.record_outcome(&ctx, &rule, false);
        }
        let fixes = engine.suggest_fixes(&ctx);
        assert_eq!(fixes[0].tier(), ConfidenceTier::Low);
    }

    #[tokio::test]
    async fn test_command_fix_success_is_learned() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), true).await;
        let ctx = engine.analyze("ls: cannot access 'build': No such file or directory", None);
        let fix = engine.suggest_fixes(&ctx).remove(0);
        assert_eq!(fix.payload.command(), Some("mkdir -p build"));

        let result = engine.apply_fix(&ctx, &fix).await.unwrap();
        assert!(result.is_applied(), "{}", result.outcome);
        assert!(dir.path().join("build").is_dir());
        assert_eq!(
            result.command_result.unwrap().status,
            ExecutionStatus::Success
        );
        let pattern = &engine.store().patterns_for(&error_signature(&ctx))[0];
        assert_eq!(pattern.uses, 1);
        assert!((pattern.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failed_fix_is_reported_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), true).await;
        let ctx = ErrorContext::unknown("boom");
        let result = engine
            .apply_fix(&ctx, &command_fix("false", 0.7))
            .await
            .unwrap();
        assert!(matches!(result.outcome, FixOutcome::Failed { .. }));
        let pattern = &engine.store().patterns_for(&error_signature(&ctx))[0];
        assert!(pattern.success_rate.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_blocked_fix_is_declined_and_not_learned() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), false).await;
        let ctx = ErrorContext::unknown("boom");
        let result = engine
            .apply_fix(&ctx, &command_fix("mkdir out", 0.7))
            .await
            .unwrap();
        assert!(matches!(result.outcome, FixOutcome::Declined { .. }));
        assert!(engine.store().is_empty());
    }

    #[tokio::test]
    async fn test_manual_hint_is_not_applicable() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), true).await;
        let ctx = engine.analyze("SyntaxError: invalid syntax", None);
        let fix = engine.suggest_fixes(&ctx).remove(0);
        let result = engine.apply_fix(&ctx, &fix).await.unwrap();
        assert!(matches!(result.outcome, FixOutcome::NotApplicable { .. }));
    }

    #[tokio::test]
    async fn test_code_edit_is_backed_up_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let original = "def main():\n\treturn 1\n";
        std::fs::write(dir.path().join("app.py"), original).unwrap();
        let engine = engine(dir.path(), true).await;
        let ctx = engine.analyze(
            "  File \"app.py\", line 2\nTabError: inconsistent use of tabs and spaces in indentation",
            None,
        );
        let fix = engine.suggest_fixes(&ctx).remove(0);
        assert!(matches!(
            fix.payload,
            FixPayload::EditCode {
                edit: CodeEdit::NormalizeIndentation { .. },
                ..
            }
        ));

        let result = engine.apply_fix(&ctx, &fix).await.unwrap();
        assert!(result.is_applied(), "{}", result.outcome);
        assert!(result.undo_point.is_some());
        let edited = std::fs::read_to_string(dir.path().join("app.py")).unwrap();
        assert_eq!(edited, "def main():\n    return 1\n");

        let ledger = engine.executor().ledger();
        assert!(ledger.rollback(&FilesOnlyRollback).await.unwrap());
        let restored = std::fs::read_to_string(dir.path().join("app.py")).unwrap();
        assert_eq!(restored, original);
    }

    #[tokio::test]
    async fn test_file_edit_without_approval_is_declined() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "\tx = 1\n").unwrap();
        let engine = engine(dir.path(), false).await;
        let ctx = engine.analyze("  File \"app.py\", line 1\nTabError: bad", None);
        let fix = engine.suggest_fixes(&ctx).remove(0);
        let result = engine.apply_fix(&ctx, &fix).await.unwrap();
        assert!(matches!(result.outcome, FixOutcome::Declined { .. }));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.py")).unwrap(),
            "\tx = 1\n"
        );
        assert!(engine.executor().ledger().undo_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_env_key_creates_dotenv() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), true).await;
        let ctx = engine.analyze("KeyError: 'API_TOKEN'", None);
        let fix = engine.suggest_fixes(&ctx).remove(0);
        let result = engine.apply_fix(&ctx, &fix).await.unwrap();
        assert!(result.is_applied(), "{}", result.outcome);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".env")).unwrap(),
            "API_TOKEN=\n"
        );
    }

    #[tokio::test]
    async fn test_recover_without_high_fix_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), true).await;
        let ctx = engine.analyze("ModuleNotFoundError: No module named 'requests'", None);
        let report = engine.recover(ctx).await.unwrap();
        assert_eq!(report.final_state(), RecoveryState::ManualFallback);
        assert!(report.applied.is_none());
        assert!(!report.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_recover_applies_learned_fix() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), true).await;
        let ctx = engine.analyze("ls: cannot access 'out': No such file or directory", None);
        let fix = command_fix("mkdir -p out", 0.65);
        for _ in 0..3 {
            engine.record_outcome(&ctx, &fix, true);
        }
        let report = engine.recover(ctx).await.unwrap();
        assert!(report.is_resolved());
        assert_eq!(
            report.states,
            vec![
                RecoveryState::Raised,
                RecoveryState::Analyzed,
                RecoveryState::FixSuggested,
                RecoveryState::FixApplied,
                RecoveryState::Resolved,
            ]
        );
        assert!(dir.path().join("out").is_dir());
    }

    #[tokio::test]
    async fn test_retry_uses_corrected_command_and_learns() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), true).await;
        let failed = engine
            .executor()
            .execute("eho hello", &ExecOptions::new(), None)
            .await;
        let ctx = engine.analyze_result(&failed);
        assert_eq!(ctx.kind, ErrorKind::CommandNotFound);
        let fix = command_fix("echo hello", 0.85);
        for _ in 0..3 {
            engine.record_outcome(&ctx, &fix, true);
        }

        let outcome = engine
            .executor()
            .execute_with_retry(
                "eho hello",
                &ExecOptions::new(),
                &RetryConfig::immediate(2),
                Some(&engine),
            )
            .await;
        assert!(outcome.succeeded());
        assert_eq!(outcome.result.stdout, "hello\n");
        assert_eq!(outcome.fixes_applied.len(), 1);
        let pattern = &engine.store().patterns_for(&error_signature(&ctx))[0];
        assert_eq!(pattern.uses, 4);
    }

    #[tokio::test]
    async fn test_abandoned_correction_is_forgotten() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), true).await;
        let failed = engine
            .executor()
            .execute("eho hello", &ExecOptions::new(), None)
            .await;
        let ctx = engine.analyze_result(&failed);
        let fix = command_fix("echo hello", 0.85);
        for _ in 0..3 {
            engine.record_outcome(&ctx, &fix, true);
        }

        let applied = engine.on_failure("eho hello", &failed).await.unwrap();
        assert_eq!(applied.replacement_command.as_deref(), Some("echo hello"));
        assert_eq!(engine.pending().len(), 1);

        engine.abandon_fix(&applied).await;
        assert!(engine.pending().is_empty());
        let pattern = &engine.store().patterns_for(&error_signature(&ctx))[0];
        assert_eq!(pattern.uses, 3);
    }

    #[tokio::test]
    async fn test_retry_advisor_respects_auto_apply_switch() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ApprovalLedger::open(
            &dir.path().join(".state"),
            dir.path(),
            RiskClassifier::new(),
            LedgerOptions::default(),
        )
        .unwrap();
        let executor =
            CommandExecutor::new(Arc::new(ledger), ExecutorConfig::default()).unwrap();
        let settings = RecoverySettings::default().with_auto_apply_high(false);
        let engine = RecoveryEngine::new(
            Arc::new(executor),
            LearnedStore::in_memory(&settings),
            settings,
        )
        .unwrap();
        let failed = CommandResult::blocked("x", rampart_core::RiskTier::Risky, "no");
        assert!(engine.on_failure("x", &failed).await.is_none());
    }
}
