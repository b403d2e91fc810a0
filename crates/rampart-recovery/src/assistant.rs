//! Human-in-the-loop recovery.

use async_trait::async_trait;
use rampart_core::{CommandResult, ErrorContext, FixSuggestion};
use std::path::Path;
use std::sync::Arc;

use crate::engine::{RecoveryEngine, RecoveryReport, conclude};
use crate::error::RecoveryResult;
use crate::state::{RecoveryState, RecoveryTracker};

/// Picks which suggestion to apply, if any.
///
/// Receives only suggestions that cleared the confidence floor, ranked HIGH
/// first. Each carries its confidence and estimated time.
#[async_trait]
pub trait RecoveryDecider: Send + Sync {
    /// Index into `suggestions` to apply, or `None` to handle it manually.
    async fn choose(&self, context: &ErrorContext, suggestions: &[FixSuggestion])
    -> Option<usize>;
}

/// Presents ranked fixes to a [`RecoveryDecider`] and applies the chosen one.
///
/// When nothing clears the floor the occurrence goes straight to
/// [`RecoveryState::ManualFallback`] and the decider is not consulted.
pub struct InteractiveRecoveryAssistant {
    engine: Arc<RecoveryEngine>,
    decider: Arc<dyn RecoveryDecider>,
    min_confidence: f64,
}

impl InteractiveRecoveryAssistant {
    /// Create an assistant using the engine's confidence floor.
    #[must_use]
    pub fn new(engine: Arc<RecoveryEngine>, decider: Arc<dyn RecoveryDecider>) -> Self {
        let min_confidence = engine.settings().min_confidence;
        Self {
            engine,
            decider,
            min_confidence,
        }
    }

    /// Override the confidence floor.
    #[must_use]
    pub fn with_min_confidence(mut self, floor: f64) -> Self {
        self.min_confidence = floor.clamp(0.0, 1.0);
        self
    }

    /// The wrapped engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<RecoveryEngine> {
        &self.engine
    }

    /// Analyze raw error text and walk it through recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger fails while applying a file fix.
    pub async fn handle(&self, raw: &str, source: Option<&Path>) -> RecoveryResult<RecoveryReport> {
        let context = self.engine.analyze(raw, source);
        self.handle_context(context).await
    }

    /// Walk a failed command through recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger fails while applying a file fix.
    pub async fn handle_result(&self, result: &CommandResult) -> RecoveryResult<RecoveryReport> {
        let context = self.engine.analyze_result(result);
        self.handle_context(context).await
    }

    /// Walk an analyzed error through recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger fails while applying a file fix.
    pub async fn handle_context(&self, context: ErrorContext) -> RecoveryResult<RecoveryReport> {
        let mut tracker = RecoveryTracker::new();
        tracker.advance(RecoveryState::Analyzed)?;

        let suggestions: Vec<FixSuggestion> = self
            .engine
            .suggest_fixes(&context)
            .into_iter()
            .filter(|s| s.confidence >= self.min_confidence)
            .collect();
        if suggestions.is_empty() {
            tracing::info!(
                kind = %context.kind,
                message = %context.message,
                "No fix clears the confidence floor, manual handling"
            );
            return manual(tracker, context, suggestions);
        }

        tracker.advance(RecoveryState::FixSuggested)?;
        let chosen = self
            .decider
            .choose(&context, &suggestions)
            .await
            .and_then(|i| suggestions.get(i).cloned());
        let Some(chosen) = chosen else {
            tracing::info!(kind = %context.kind, "Fix declined, manual handling");
            return manual(tracker, context, suggestions);
        };

        let result = self.engine.apply_fix(&context, &chosen).await?;
        conclude(&mut tracker, &result)?;
        tracing::info!(
            kind = %context.kind,
            fix = %chosen.description,
            state = %tracker.state(),
            "Recovery finished"
        );
        Ok(RecoveryReport {
            context,
            suggestions,
            applied: Some(result),
            states: tracker.into_visited(),
        })
    }
}

fn manual(
    mut tracker: RecoveryTracker,
    context: ErrorContext,
    suggestions: Vec<FixSuggestion>,
) -> RecoveryResult<RecoveryReport> {
    tracker.advance(RecoveryState::ManualFallback)?;
    Ok(RecoveryReport {
        context,
        suggestions,
        applied: None,
        states: tracker.into_visited(),
    })
}

impl std::fmt::Debug for InteractiveRecoveryAssistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveRecoveryAssistant")
            .field("engine", &self.engine)
            .field("min_confidence", &self.min_confidence)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learned::LearnedStore;
    use crate::settings::RecoverySettings;
    use rampart_approval::{
        ApprovalDecision, ApprovalHandler, ApprovalLedger, ApprovalRequest, ApprovalResponse,
        LedgerOptions, RiskClassifier,
    };
    use rampart_exec::{CommandExecutor, ExecutorConfig};
    use std::sync::Mutex;

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

    /// Picks a fixed index and remembers what it was shown.
    struct Pick {
        index: Option<usize>,
        shown: Mutex<Vec<FixSuggestion>>,
    }

    impl Pick {
        fn new(index: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                index,
                shown: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RecoveryDecider for Pick {
        async fn choose(
            &self,
            _context: &ErrorContext,
            suggestions: &[FixSuggestion],
        ) -> Option<usize> {
            self.shown.lock().unwrap().extend_from_slice(suggestions);
            self.index
        }
    }

    async fn engine(dir: &Path) -> Arc<RecoveryEngine> {
        let ledger = ApprovalLedger::open(
            &dir.join(".state"),
            dir,
            RiskClassifier::new(),
            LedgerOptions::default(),
        )
        .unwrap();
        ledger.register_handler(Arc::new(ApproveAll)).await;
        let executor = CommandExecutor::new(
            Arc::new(ledger),
            ExecutorConfig::default().with_working_dir(dir),
        )
        .unwrap();
        let settings = RecoverySettings::default();
        Arc::new(
            RecoveryEngine::new(
                Arc::new(executor),
                LearnedStore::in_memory(&settings),
                settings,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_chosen_fix_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let pick = Pick::new(Some(0));
        let assistant = InteractiveRecoveryAssistant::new(engine(dir.path()).await, pick.clone());
        let report = assistant
            .handle(
                "ls: cannot access 'reports': No such file or directory",
                None,
            )
            .await
            .unwrap();
        assert!(report.is_resolved());
        assert!(dir.path().join("reports").is_dir());
        assert_eq!(pick.shown.lock().unwrap().len(), 1);
        assert!(report.states.contains(&RecoveryState::FixApplied));
    }

    #[tokio::test]
    async fn test_low_confidence_goes_manual_without_asking() {
        let dir = tempfile::tempdir().unwrap();
        let pick = Pick::new(Some(0));
        let assistant = InteractiveRecoveryAssistant::new(engine(dir.path()).await, pick.clone());
        let report = assistant
            .handle("SyntaxError: invalid syntax", None)
            .await
            .unwrap();
        assert_eq!(report.final_state(), RecoveryState::ManualFallback);
        assert!(report.applied.is_none());
        assert_eq!(report.context.message, "SyntaxError: invalid syntax");
        assert!(pick.shown.lock().unwrap().is_empty());
        assert_eq!(
            report.states,
            vec![
                RecoveryState::Raised,
                RecoveryState::Analyzed,
                RecoveryState::ManualFallback
            ]
        );
    }

    #[tokio::test]
    async fn test_declined_fix_goes_manual() {
        let dir = tempfile::tempdir().unwrap();
        let assistant =
            InteractiveRecoveryAssistant::new(engine(dir.path()).await, Pick::new(None));
        let report = assistant
            .handle("ModuleNotFoundError: No module named 'requests'", None)
            .await
            .unwrap();
        assert_eq!(report.final_state(), RecoveryState::ManualFallback);
        assert!(report.states.contains(&RecoveryState::FixSuggested));
        assert!(assistant.engine().store().is_empty());
    }

    #[tokio::test]
    async fn test_failed_fix_ends_failed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blocker"), "").unwrap();
        let assistant =
            InteractiveRecoveryAssistant::new(engine(dir.path()).await, Pick::new(Some(0)));
        // `mkdir -p blocker/sub` fails: `blocker` is a file.
        let report = assistant
            .handle(
                "FileNotFoundError: [Errno 2] No such file or directory: 'blocker/sub/x.txt'",
                None,
            )
            .await
            .unwrap();
        assert_eq!(report.final_state(), RecoveryState::Failed);
        let pattern = &assistant.engine().store().patterns_for(&crate::error_signature(
            &report.context,
        ))[0];
        assert_eq!(pattern.uses, 1);
        assert!(pattern.success_rate.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_floor_override() {
        let dir = tempfile::tempdir().unwrap();
        let pick = Pick::new(None);
        let assistant = InteractiveRecoveryAssistant::new(engine(dir.path()).await, pick.clone())
            .with_min_confidence(0.0);
        assistant
            .handle("SyntaxError: invalid syntax", None)
            .await
            .unwrap();
        assert_eq!(pick.shown.lock().unwrap().len(), 1);
    }
}
