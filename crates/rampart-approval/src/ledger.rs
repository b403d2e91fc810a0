//! The approval ledger - central authority for approve/reject/undo.
//!
//! # Decision Flow
//!
//! 1. An operation referenced by an unresolved conflict is deferred
//! 2. The risk tier is recomputed from the operation itself
//! 3. SAFE operations are auto-approved when enabled
//! 4. A stored preference is reused, except for DANGEROUS operations
//! 5. Otherwise the registered [`ApprovalHandler`] is asked; no handler, an
//!    unavailable handler, no answer or a timeout all defer
//! 6. "Always" answers are remembered, except for DANGEROUS operations

use rampart_conflict::Conflict;
use rampart_core::{
    CoreError, Decision, Operation, OperationId, Snapshot, UndoPoint, UndoPointId,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use crate::error::LedgerResult;
use crate::handler::ApprovalHandler;
use crate::preferences::{PreferencePattern, PreferenceStore};
use crate::request::ApprovalRequest;
use crate::risk::{RiskAssessment, RiskClassifier};
use crate::rollback::{RollbackHook, StagedRestore};
use crate::undo::UndoStore;

/// Default bound on the undo history.
pub const DEFAULT_MAX_UNDO_POINTS: usize = 50;

/// Metadata key holding an inverse command for a command operation.
pub const INVERSE_METADATA_KEY: &str = "inverse";

/// Ledger behavior knobs.
#[derive(Debug, Clone)]
pub struct LedgerOptions {
    /// Approve SAFE operations without asking.
    pub auto_approve_safe: bool,
    /// How long to wait for the handler. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Bound on the undo history.
    pub max_undo_points: usize,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            auto_approve_safe: true,
            timeout: None,
            max_undo_points: DEFAULT_MAX_UNDO_POINTS,
        }
    }
}

impl LedgerOptions {
    /// Enable or disable SAFE auto-approval.
    #[must_use]
    pub fn with_auto_approve_safe(mut self, enabled: bool) -> Self {
        self.auto_approve_safe = enabled;
        self
    }

    /// Bound the wait for a handler answer.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound the undo history.
    #[must_use]
    pub fn with_max_undo_points(mut self, max: usize) -> Self {
        self.max_undo_points = max;
        self
    }
}

/// Where a decision came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionSource {
    /// The operation already carried a final decision.
    AlreadyDecided,
    /// An unresolved conflict references the operation.
    UnresolvedConflict,
    /// SAFE and auto-approval is enabled.
    AutoApprove,
    /// A stored preference matched.
    Preference(PreferencePattern),
    /// The handler answered.
    Handler,
    /// No handler is registered.
    NoHandler,
    /// The handler reported itself unavailable.
    HandlerUnavailable,
    /// The handler did not answer within the timeout.
    TimedOut,
    /// The handler returned no answer.
    NoResponse,
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyDecided => write!(f, "already decided"),
            Self::UnresolvedConflict => write!(f, "unresolved conflict"),
            Self::AutoApprove => write!(f, "auto-approved as safe"),
            Self::Preference(pattern) => write!(f, "stored preference {pattern}"),
            Self::Handler => write!(f, "approval handler"),
            Self::NoHandler => write!(f, "no approval handler registered"),
            Self::HandlerUnavailable => write!(f, "approval handler unavailable"),
            Self::TimedOut => write!(f, "approval request timed out"),
            Self::NoResponse => write!(f, "no response to approval request"),
        }
    }
}

/// A decision with the context that produced it.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    /// The decision recorded on the operation.
    pub decision: Decision,
    /// Risk assessment of the operation.
    pub assessment: RiskAssessment,
    /// How the decision was reached.
    pub source: DecisionSource,
    /// Rejection reason given by the handler, if any.
    pub reason: Option<String>,
}

impl ApprovalOutcome {
    /// Check if the operation may run.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.decision.is_approved()
    }

    /// One-line explanation suitable for a BLOCKED result.
    #[must_use]
    pub fn explain(&self) -> String {
        let mut text = format!("{} ({})", self.decision, self.source);
        if let Some(reason) = &self.reason {
            text.push_str(": ");
            text.push_str(reason);
        }
        text
    }
}

/// Central authority for approval decisions, preferences and undo history.
pub struct ApprovalLedger {
    classifier: RiskClassifier,
    preferences: PreferenceStore,
    undo: Mutex<UndoStore>,
    handler: RwLock<Option<Arc<dyn ApprovalHandler>>>,
    options: LedgerOptions,
    workspace_root: PathBuf,
}

impl ApprovalLedger {
    /// Open the ledger with persisted state under `state_dir`.
    ///
    /// Relative file targets are resolved against `workspace_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the undo store is locked by another process or
    /// persisted state cannot be read.
    pub fn open(
        state_dir: &Path,
        workspace_root: impl Into<PathBuf>,
        classifier: RiskClassifier,
        options: LedgerOptions,
    ) -> LedgerResult<Self> {
        let undo = UndoStore::open(state_dir, options.max_undo_points)?;
        let preferences = PreferenceStore::open(state_dir.join("preferences.json"))?;
        Ok(Self {
            classifier,
            preferences,
            undo: Mutex::new(undo),
            handler: RwLock::new(None),
            options,
            workspace_root: workspace_root.into(),
        })
    }

    /// Register the approval handler (UI frontend).
    pub async fn register_handler(&self, handler: Arc<dyn ApprovalHandler>) {
        *self.handler.write().await = Some(handler);
    }

    /// Remove the approval handler. Later requests are deferred.
    pub async fn clear_handler(&self) {
        *self.handler.write().await = None;
    }

    /// The risk classifier.
    #[must_use]
    pub fn classifier(&self) -> &RiskClassifier {
        &self.classifier
    }

    /// The preference store.
    #[must_use]
    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    /// Ledger options.
    #[must_use]
    pub fn options(&self) -> &LedgerOptions {
        &self.options
    }

    /// Workspace root used to resolve relative targets.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Absolute location of a file target.
    #[must_use]
    pub fn resolve(&self, target: &Path) -> PathBuf {
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.workspace_root
                .join(rampart_conflict::normalize_resource(target))
        }
    }

    /// Decide an operation and record the decision on it.
    ///
    /// # Errors
    ///
    /// Returns an error only if the decision cannot be recorded on the
    /// operation. Rejections and deferrals are decisions.
    pub async fn request_approval(
        &self,
        operation: &mut Operation,
        conflicts: &[Conflict],
    ) -> LedgerResult<Decision> {
        Ok(self.check_approval(operation, conflicts).await?.decision)
    }

    /// Like [`request_approval`](Self::request_approval), with the context
    /// that produced the decision.
    ///
    /// # Errors
    ///
    /// Returns an error only if the decision cannot be recorded.
    pub async fn check_approval(
        &self,
        operation: &mut Operation,
        conflicts: &[Conflict],
    ) -> LedgerResult<ApprovalOutcome> {
        let assessment = self.classifier.assess_operation(operation);
        operation.risk = assessment.tier;

        if operation.decision().is_final() {
            return Ok(ApprovalOutcome {
                decision: operation.decision(),
                assessment,
                source: DecisionSource::AlreadyDecided,
                reason: None,
            });
        }

        if let Some(conflict) = conflicts
            .iter()
            .find(|c| !c.resolved && c.involves(operation.id))
        {
            tracing::info!(
                operation_id = %operation.id,
                conflict_id = %conflict.id,
                kind = %conflict.kind,
                "Deferring operation with unresolved conflict"
            );
            return Self::finish(
                operation,
                Decision::Deferred,
                assessment,
                DecisionSource::UnresolvedConflict,
                Some(conflict.reason.clone()),
            );
        }

        if assessment.tier.is_auto_approvable() && self.options.auto_approve_safe {
            return Self::finish(
                operation,
                Decision::AutoApproved,
                assessment,
                DecisionSource::AutoApprove,
                None,
            );
        }

        if assessment.tier.allows_preferences()
            && let Some(preference) = self.preferences.lookup(operation)
        {
            return Self::finish(
                operation,
                preference.decision,
                assessment,
                DecisionSource::Preference(preference.pattern),
                None,
            );
        }

        let (decision, source, reason) = self.ask_handler(operation, &assessment).await;
        Self::finish(operation, decision, assessment, source, reason)
    }

    async fn ask_handler(
        &self,
        operation: &Operation,
        assessment: &RiskAssessment,
    ) -> (Decision, DecisionSource, Option<String>) {
        let handler = {
            let guard = self.handler.read().await;
            match guard.as_ref() {
                Some(h) => Arc::clone(h),
                None => return (Decision::Deferred, DecisionSource::NoHandler, None),
            }
        };
        if !handler.is_available() {
            return (Decision::Deferred, DecisionSource::HandlerUnavailable, None);
        }

        let request = ApprovalRequest::new(operation.clone(), assessment.clone());
        let allows_preferences = request.allows_preferences();
        tracing::debug!(request_id = %request.id, operation_id = %operation.id, "Asking approval handler");

        let response = match self.options.timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, handler.request_approval(request)).await {
                    Ok(response) => response,
                    Err(_) => {
                        tracing::warn!(
                            operation_id = %operation.id,
                            timeout_ms = timeout.as_millis(),
                            "Approval request timed out"
                        );
                        return (Decision::Deferred, DecisionSource::TimedOut, None);
                    },
                }
            },
            None => handler.request_approval(request).await,
        };
        let Some(response) = response else {
            return (Decision::Deferred, DecisionSource::NoResponse, None);
        };

        let decision = response.decision.to_decision();
        if response.decision.is_always() {
            if allows_preferences {
                if let Some(pattern) = PreferencePattern::derive(operation)
                    && let Err(e) = self.preferences.remember(pattern, decision)
                {
                    tracing::warn!("failed to store preference: {e}");
                }
            } else {
                tracing::warn!(
                    operation_id = %operation.id,
                    "Not remembering an answer for a dangerous operation"
                );
            }
        }
        let reason = response.decision.rejection_reason().map(str::to_string);
        (decision, DecisionSource::Handler, reason)
    }

    fn finish(
        operation: &mut Operation,
        decision: Decision,
        assessment: RiskAssessment,
        source: DecisionSource,
        reason: Option<String>,
    ) -> LedgerResult<ApprovalOutcome> {
        operation.record_decision(decision)?;
        tracing::info!(
            operation_id = %operation.id,
            risk = %assessment.tier,
            %decision,
            source = %source,
            "Operation decided"
        );
        Ok(ApprovalOutcome {
            decision,
            assessment,
            source,
            reason,
        })
    }

    /// Decide every operation of a batch in submission order.
    ///
    /// # Errors
    ///
    /// Returns an error only if a decision cannot be recorded.
    pub async fn batch_approval(
        &self,
        operations: &mut [Operation],
        conflicts: &[Conflict],
    ) -> LedgerResult<Vec<Decision>> {
        let mut decisions = Vec::with_capacity(operations.len());
        for operation in operations.iter_mut() {
            decisions.push(self.request_approval(operation, conflicts).await?);
        }
        Ok(decisions)
    }

    /// Persist a preference.
    ///
    /// # Errors
    ///
    /// Returns an error for decisions other than approve/reject or if the
    /// store cannot be written.
    pub fn remember_preference(
        &self,
        pattern: PreferencePattern,
        decision: Decision,
    ) -> LedgerResult<()> {
        self.preferences.remember(pattern, decision)
    }

    /// Back up every file the operations will mutate.
    ///
    /// Inverse commands recorded under the `inverse` metadata key of command
    /// operations are added to the snapshot in submission order; rollback
    /// runs them newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read or stored.
    pub async fn capture_snapshot(&self, operations: &[Operation]) -> LedgerResult<Snapshot> {
        let undo = self.undo.lock().await;
        let mut snapshot = Snapshot::new();
        for operation in operations {
            if operation.kind.mutates_file() {
                let path = self.resolve(operation.target_path());
                if !snapshot.covers(&path) {
                    snapshot = snapshot.with_file(undo.backup(&path)?);
                }
            } else if let Some(inverse) = operation.metadata.get(INVERSE_METADATA_KEY) {
                snapshot = snapshot.with_inverse(inverse.clone());
            }
        }
        Ok(snapshot)
    }

    /// Record an undo point for operations about to be applied.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if a file-mutating operation
    /// has no backup in `snapshot`, or a storage error if the point cannot
    /// be persisted.
    pub async fn create_undo_point(
        &self,
        operations: Vec<Operation>,
        snapshot: Snapshot,
        description: impl Into<String>,
    ) -> LedgerResult<UndoPoint> {
        if let Some(uncovered) = operations
            .iter()
            .filter(|op| op.kind.mutates_file())
            .find(|op| !snapshot.covers(&self.resolve(op.target_path())))
        {
            return Err(CoreError::InvalidOperation(format!(
                "{} ({}) has no backup in the snapshot",
                uncovered.id, uncovered.target
            ))
            .into());
        }
        let point = UndoPoint::new(operations, snapshot, description);
        self.undo.lock().await.push(point.clone())?;
        Ok(point)
    }

    /// Narrow undo point `id` to the operations in `applied`.
    ///
    /// Backups for paths no kept operation writes and inverse commands of
    /// dropped operations are discarded. When nothing is left the point is
    /// removed and `None` is returned.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the history cannot be written.
    pub async fn retain_applied(
        &self,
        id: UndoPointId,
        applied: &[OperationId],
    ) -> LedgerResult<Option<UndoPoint>> {
        let mut undo = self.undo.lock().await;
        let Some(mut point) = undo.points().find(|p| p.id == id).cloned() else {
            return Ok(None);
        };
        if point.operations.iter().all(|op| applied.contains(&op.id)) {
            return Ok(Some(point));
        }

        let dropped = point
            .operations
            .iter()
            .filter(|op| !applied.contains(&op.id))
            .count();
        point.operations.retain(|op| applied.contains(&op.id));
        let written: Vec<PathBuf> = point
            .operations
            .iter()
            .filter(|op| op.kind.mutates_file())
            .map(|op| self.resolve(op.target_path()))
            .collect();
        point.snapshot.files.retain(|backup| written.contains(&backup.path));
        point.snapshot.inverse_commands = point
            .operations
            .iter()
            .filter(|op| !op.kind.mutates_file())
            .filter_map(|op| op.metadata.get(INVERSE_METADATA_KEY).cloned())
            .collect();

        if point.operations.is_empty() || point.snapshot.is_empty() {
            undo.remove(id)?;
            tracing::info!(undo_point = %id, dropped, "Dropped undo point, nothing took effect");
            return Ok(None);
        }
        undo.amend(point.clone())?;
        tracing::info!(
            undo_point = %id,
            dropped,
            kept = point.operations.len(),
            "Narrowed undo point to applied operations"
        );
        Ok(Some(point))
    }

    /// Roll back the most recent undo point.
    ///
    /// Inverse commands run newest first, then files are restored
    /// all-or-nothing. Each inverse that succeeds is struck from the stored
    /// point before the next one runs, so a rollback that stops part way
    /// resumes with the first pending inverse and never repeats one.
    ///
    /// Returns `Ok(false)` without changing anything when the history is
    /// empty, the hook vetoes, or the first inverse command fails.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PartialRollback`](crate::LedgerError::PartialRollback)
    /// if an inverse fails after others have run (in this or an earlier
    /// attempt), [`LedgerError::RollbackFailed`](crate::LedgerError::RollbackFailed)
    /// if a file could not be restored (restored files are reverted), or a
    /// storage error if a backup is missing.
    pub async fn rollback(&self, hook: &dyn RollbackHook) -> LedgerResult<bool> {
        let mut undo = self.undo.lock().await;
        let Some(mut point) = undo.peek().cloned() else {
            tracing::debug!("Nothing to roll back");
            return Ok(false);
        };
        if !hook.confirm(&point).await {
            tracing::info!(undo_point = %point.id, "Rollback declined");
            return Ok(false);
        }

        let mut staged = StagedRestore::stage(&point.snapshot, &undo)?;
        while let Some(command) = point.snapshot.inverse_commands.last().cloned() {
            if !hook.run_inverse(&command).await {
                if !point.snapshot.is_partially_rolled_back() {
                    tracing::warn!(undo_point = %point.id, command, "Inverse command failed, rollback aborted");
                    return Ok(false);
                }
                tracing::error!(
                    undo_point = %point.id,
                    command,
                    completed = point.snapshot.completed_inverses,
                    "Inverse command failed part way through rollback"
                );
                return Err(crate::LedgerError::PartialRollback {
                    point: point.id.to_string(),
                    command,
                    completed: point.snapshot.completed_inverses,
                    remaining: point.snapshot.inverse_commands.len(),
                });
            }
            point.snapshot.complete_last_inverse();
            undo.amend(point.clone())?;
        }

        staged.refresh_current()?;
        staged.apply(&point)?;
        undo.pop()?;
        tracing::info!(
            undo_point = %point.id,
            description = %point.description,
            files = point.snapshot.files.len(),
            inverses = point.snapshot.completed_inverses,
            "Rolled back"
        );
        Ok(true)
    }

    /// Undo points, most recent first.
    pub async fn undo_history(&self) -> Vec<UndoPoint> {
        self.undo.lock().await.points().cloned().collect()
    }
}

impl fmt::Debug for ApprovalLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalLedger")
            .field("classifier", &self.classifier)
            .field("preferences", &self.preferences)
            .field("options", &self.options)
            .field("workspace_root", &self.workspace_root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ApprovalDecision, ApprovalResponse};
    use crate::rollback::FilesOnlyRollback;
    use async_trait::async_trait;
    use rampart_conflict::{ConflictDetector, FsDiskState};
    use rampart_core::{OperationKind, RiskTier};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Answer {
        decision: ApprovalDecision,
        calls: AtomicUsize,
    }

    impl Answer {
        fn new(decision: ApprovalDecision) -> Arc<Self> {
            Arc::new(Self {
                decision,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ApprovalHandler for Answer {
        async fn request_approval(&self, request: ApprovalRequest) -> Option<ApprovalResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(ApprovalResponse::new(request.id, self.decision.clone()))
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    struct Unavailable;

    #[async_trait]
    impl ApprovalHandler for Unavailable {
        async fn request_approval(&self, _request: ApprovalRequest) -> Option<ApprovalResponse> {
            None
        }

        fn is_available(&self) -> bool {
            false
        }
    }

    struct Silent;

    #[async_trait]
    impl ApprovalHandler for Silent {
        async fn request_approval(&self, _request: ApprovalRequest) -> Option<ApprovalResponse> {
            None
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    struct Slow;

    #[async_trait]
    impl ApprovalHandler for Slow {
        async fn request_approval(&self, request: ApprovalRequest) -> Option<ApprovalResponse> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Some(ApprovalResponse::new(request.id, ApprovalDecision::Approve))
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    struct Veto;

    #[async_trait]
    impl RollbackHook for Veto {
        async fn confirm(&self, _point: &UndoPoint) -> bool {
            false
        }

        async fn run_inverse(&self, _command: &str) -> bool {
            true
        }
    }

    /// Runs every inverse, failing `fail_once` the first time it is seen.
    #[derive(Default)]
    struct FlakyInverses {
        fail_once: std::sync::Mutex<Option<String>>,
        ran: std::sync::Mutex<Vec<String>>,
    }

    impl FlakyInverses {
        fn failing_once(command: &str) -> Self {
            Self {
                fail_once: std::sync::Mutex::new(Some(command.to_string())),
                ran: std::sync::Mutex::default(),
            }
        }

        fn ran(&self) -> Vec<String> {
            self.ran.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RollbackHook for FlakyInverses {
        async fn confirm(&self, _point: &UndoPoint) -> bool {
            true
        }

        async fn run_inverse(&self, command: &str) -> bool {
            self.ran.lock().unwrap().push(command.to_string());
            let mut fail_once = self.fail_once.lock().unwrap();
            if fail_once.as_deref() == Some(command) {
                *fail_once = None;
                return false;
            }
            true
        }
    }

    async fn record_two_inverses(dir: &Path, ledger: &ApprovalLedger) {
        std::fs::write(dir.join("out.txt"), "before").unwrap();
        let ops = vec![
            Operation::command("make first").with_metadata(INVERSE_METADATA_KEY, "undo-first"),
            Operation::command("make second").with_metadata(INVERSE_METADATA_KEY, "undo-second"),
            Operation::file_modify("out.txt", "after"),
        ];
        let snapshot = ledger.capture_snapshot(&ops).await.unwrap();
        ledger.create_undo_point(ops, snapshot, "two steps").await.unwrap();
        std::fs::write(dir.join("out.txt"), "after").unwrap();
    }

    fn ledger(options: LedgerOptions) -> (TempDir, ApprovalLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ApprovalLedger::open(
            &dir.path().join("state"),
            dir.path(),
            RiskClassifier::new(),
            options,
        )
        .unwrap();
        (dir, ledger)
    }

    #[tokio::test]
    async fn test_safe_auto_approved() {
        let (_dir, ledger) = ledger(LedgerOptions::default());
        let mut op = Operation::command("git status");
        let outcome = ledger.check_approval(&mut op, &[]).await.unwrap();
        assert_eq!(outcome.decision, Decision::AutoApproved);
        assert_eq!(outcome.source, DecisionSource::AutoApprove);
        assert_eq!(op.risk, RiskTier::Safe);
        assert_eq!(op.decision(), Decision::AutoApproved);
    }

    #[tokio::test]
    async fn test_safe_asks_when_auto_approve_disabled() {
        let (_dir, ledger) = ledger(LedgerOptions::default().with_auto_approve_safe(false));
        let handler = Answer::new(ApprovalDecision::Approve);
        ledger.register_handler(handler.clone()).await;
        let mut op = Operation::command("ls");
        assert_eq!(
            ledger.request_approval(&mut op, &[]).await.unwrap(),
            Decision::Approved
        );
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_handler_defers() {
        let (_dir, ledger) = ledger(LedgerOptions::default());
        let mut op = Operation::command("pip install requests");
        let outcome = ledger.check_approval(&mut op, &[]).await.unwrap();
        assert_eq!(outcome.decision, Decision::Deferred);
        assert_eq!(outcome.source, DecisionSource::NoHandler);
        assert!(!op.decision().is_approved());
    }

    #[tokio::test]
    async fn test_unavailable_and_silent_handlers_defer() {
        let (_dir, ledger) = ledger(LedgerOptions::default());
        ledger.register_handler(Arc::new(Unavailable)).await;
        let mut op = Operation::command("npm install");
        let outcome = ledger.check_approval(&mut op, &[]).await.unwrap();
        assert_eq!(outcome.source, DecisionSource::HandlerUnavailable);

        ledger.register_handler(Arc::new(Silent)).await;
        let mut op = Operation::command("npm install");
        let outcome = ledger.check_approval(&mut op, &[]).await.unwrap();
        assert_eq!(outcome.decision, Decision::Deferred);
        assert_eq!(outcome.source, DecisionSource::NoResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_defers() {
        let (_dir, ledger) =
            ledger(LedgerOptions::default().with_timeout(Duration::from_millis(50)));
        ledger.register_handler(Arc::new(Slow)).await;
        let mut op = Operation::command("cargo publish");
        let outcome = ledger.check_approval(&mut op, &[]).await.unwrap();
        assert_eq!(outcome.decision, Decision::Deferred);
        assert_eq!(outcome.source, DecisionSource::TimedOut);
    }

    #[tokio::test]
    async fn test_rejection_reason_is_kept() {
        let (_dir, ledger) = ledger(LedgerOptions::default());
        ledger
            .register_handler(Answer::new(ApprovalDecision::reject("not on main")))
            .await;
        let mut op = Operation::command("git commit -am wip");
        let outcome = ledger.check_approval(&mut op, &[]).await.unwrap();
        assert_eq!(outcome.decision, Decision::Rejected);
        assert_eq!(outcome.reason.as_deref(), Some("not on main"));
        assert!(outcome.explain().contains("not on main"));
    }

    #[tokio::test]
    async fn test_always_answer_creates_preference() {
        let (_dir, ledger) = ledger(LedgerOptions::default());
        let handler = Answer::new(ApprovalDecision::ApproveAlways);
        ledger.register_handler(handler.clone()).await;

        let mut first = Operation::command("pip install requests");
        ledger.request_approval(&mut first, &[]).await.unwrap();
        let mut second = Operation::command("pip install flask");
        let outcome = ledger.check_approval(&mut second, &[]).await.unwrap();

        assert_eq!(outcome.decision, Decision::Approved);
        assert_eq!(
            outcome.source,
            DecisionSource::Preference(PreferencePattern::command_prefix("pip install"))
        );
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_dangerous_ignores_preferences_and_is_not_remembered() {
        let (_dir, ledger) = ledger(LedgerOptions::default());
        ledger
            .remember_preference(PreferencePattern::command_prefix("rm"), Decision::Approved)
            .unwrap();
        let handler = Answer::new(ApprovalDecision::ApproveAlways);
        ledger.register_handler(handler.clone()).await;

        let mut op = Operation::command("rm -rf build");
        let outcome = ledger.check_approval(&mut op, &[]).await.unwrap();
        assert_eq!(outcome.assessment.tier, RiskTier::Dangerous);
        assert_eq!(outcome.source, DecisionSource::Handler);
        assert_eq!(handler.calls(), 1);
        assert_eq!(ledger.preferences().len(), 1);
    }

    #[tokio::test]
    async fn test_stored_rejection_is_reused() {
        let (_dir, ledger) = ledger(LedgerOptions::default());
        ledger
            .remember_preference(
                PreferencePattern::file_glob("*.lock").unwrap(),
                Decision::Rejected,
            )
            .unwrap();
        let mut op = Operation::file_modify("Cargo.lock", "x");
        assert_eq!(
            ledger.request_approval(&mut op, &[]).await.unwrap(),
            Decision::Rejected
        );
    }

    #[tokio::test]
    async fn test_unresolved_conflict_defers() {
        let (dir, ledger) = ledger(LedgerOptions::default());
        std::fs::write(dir.path().join("config.yaml"), "a: 1\n").unwrap();
        let mut batch = vec![
            Operation::file_modify("config.yaml", "a: 2\n").read_from(b"a: 1\n"),
            Operation::file_modify("config.yaml", "a: 3\n").read_from(b"a: 1\n"),
        ];
        let conflicts = ConflictDetector::new()
            .detect(&batch, &FsDiskState::new(dir.path()))
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        ledger
            .register_handler(Answer::new(ApprovalDecision::Approve))
            .await;

        let decisions = ledger.batch_approval(&mut batch, &conflicts).await.unwrap();
        assert_eq!(decisions, vec![Decision::Deferred, Decision::Deferred]);

        let mut resolved = conflicts.clone();
        resolved[0].resolved = true;
        let decisions = ledger.batch_approval(&mut batch, &resolved).await.unwrap();
        assert_eq!(decisions, vec![Decision::Approved, Decision::Approved]);
    }

    #[tokio::test]
    async fn test_final_decision_is_sticky() {
        let (_dir, ledger) = ledger(LedgerOptions::default());
        let mut op = Operation::command("ls");
        ledger.request_approval(&mut op, &[]).await.unwrap();
        let outcome = ledger.check_approval(&mut op, &[]).await.unwrap();
        assert_eq!(outcome.source, DecisionSource::AlreadyDecided);
        assert_eq!(outcome.decision, Decision::AutoApproved);
    }

    #[tokio::test]
    async fn test_undo_point_requires_backups() {
        let (_dir, ledger) = ledger(LedgerOptions::default());
        let op = Operation::file_modify("a.txt", "x");
        let err = ledger
            .create_undo_point(vec![op], Snapshot::new(), "missing backup")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::LedgerError::Core(CoreError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_apply_rollback_roundtrip() {
        let (dir, ledger) = ledger(LedgerOptions::default());
        let existing = dir.path().join("notes.txt");
        std::fs::write(&existing, "original\n").unwrap();
        let ops = vec![
            Operation::file_modify("notes.txt", "changed\n"),
            Operation::file_create("new.txt", "fresh\n"),
            Operation::file_modify("./notes.txt", "changed again\n"),
        ];

        let snapshot = ledger.capture_snapshot(&ops).await.unwrap();
        assert_eq!(snapshot.files.len(), 2);
        ledger
            .create_undo_point(ops, snapshot, "edit notes")
            .await
            .unwrap();
        std::fs::write(&existing, "changed again\n").unwrap();
        std::fs::write(dir.path().join("new.txt"), "fresh\n").unwrap();

        assert!(ledger.rollback(&FilesOnlyRollback).await.unwrap());
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "original\n");
        assert!(!dir.path().join("new.txt").exists());

        // Nothing left: a second rollback is a no-op.
        assert!(!ledger.rollback(&FilesOnlyRollback).await.unwrap());
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "original\n");
    }

    #[tokio::test]
    async fn test_vetoed_rollback_keeps_point() {
        let (dir, ledger) = ledger(LedgerOptions::default());
        std::fs::write(dir.path().join("a.txt"), "v1").unwrap();
        let ops = vec![Operation::file_modify("a.txt", "v2")];
        let snapshot = ledger.capture_snapshot(&ops).await.unwrap();
        ledger.create_undo_point(ops, snapshot, "edit").await.unwrap();
        std::fs::write(dir.path().join("a.txt"), "v2").unwrap();

        assert!(!ledger.rollback(&Veto).await.unwrap());
        assert_eq!(ledger.undo_history().await.len(), 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_failed_inverse_keeps_point_and_files() {
        let (dir, ledger) = ledger(LedgerOptions::default());
        std::fs::write(dir.path().join("req.txt"), "flask\n").unwrap();
        let ops = vec![
            Operation::command("pip install requests")
                .with_metadata(INVERSE_METADATA_KEY, "pip uninstall -y requests"),
            Operation::file_modify("req.txt", "flask\nrequests\n"),
        ];
        let snapshot = ledger.capture_snapshot(&ops).await.unwrap();
        assert_eq!(snapshot.inverse_commands, vec!["pip uninstall -y requests"]);
        ledger.create_undo_point(ops, snapshot, "install").await.unwrap();
        std::fs::write(dir.path().join("req.txt"), "flask\nrequests\n").unwrap();

        assert!(!ledger.rollback(&FilesOnlyRollback).await.unwrap());
        assert_eq!(ledger.undo_history().await.len(), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("req.txt")).unwrap(),
            "flask\nrequests\n"
        );
    }

    #[tokio::test]
    async fn test_partial_rollback_resumes_without_repeating() {
        let (dir, ledger) = ledger(LedgerOptions::default());
        record_two_inverses(dir.path(), &ledger).await;
        let hook = FlakyInverses::failing_once("undo-first");

        let err = ledger.rollback(&hook).await.unwrap_err();
        assert!(matches!(
            err,
            crate::LedgerError::PartialRollback {
                completed: 1,
                remaining: 1,
                ..
            }
        ));
        let history = ledger.undo_history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].snapshot.inverse_commands, vec!["undo-first"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "after"
        );

        assert!(ledger.rollback(&hook).await.unwrap());
        assert_eq!(hook.ran(), vec!["undo-second", "undo-first", "undo-first"]);
        assert!(ledger.undo_history().await.is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "before"
        );
    }

    #[tokio::test]
    async fn test_partial_rollback_progress_survives_reopen() {
        let (dir, first) = ledger(LedgerOptions::default());
        record_two_inverses(dir.path(), &first).await;
        let flaky = FlakyInverses::failing_once("undo-first");
        assert!(first.rollback(&flaky).await.is_err());
        drop(first);

        let reopened = ApprovalLedger::open(
            &dir.path().join("state"),
            dir.path(),
            RiskClassifier::new(),
            LedgerOptions::default(),
        )
        .unwrap();
        let hook = FlakyInverses::default();
        assert!(reopened.rollback(&hook).await.unwrap());
        assert_eq!(hook.ran(), vec!["undo-first"]);
    }

    #[tokio::test]
    async fn test_first_inverse_failure_changes_nothing() {
        let (dir, ledger) = ledger(LedgerOptions::default());
        record_two_inverses(dir.path(), &ledger).await;
        let hook = FlakyInverses::failing_once("undo-second");

        assert!(!ledger.rollback(&hook).await.unwrap());
        let history = ledger.undo_history().await;
        assert_eq!(
            history[0].snapshot.inverse_commands,
            vec!["undo-first", "undo-second"]
        );
        assert!(!history[0].snapshot.is_partially_rolled_back());
    }

    #[tokio::test]
    async fn test_retain_applied_narrows_and_drops() {
        let (dir, ledger) = ledger(LedgerOptions::default());
        std::fs::write(dir.path().join("kept.txt"), "old").unwrap();
        let ops = vec![
            Operation::command("make first").with_metadata(INVERSE_METADATA_KEY, "undo-first"),
            Operation::file_modify("kept.txt", "new"),
            Operation::command("make second").with_metadata(INVERSE_METADATA_KEY, "undo-second"),
            Operation::file_create("skipped.txt", "never"),
        ];
        let (first, kept) = (ops[0].id, ops[1].id);
        let snapshot = ledger.capture_snapshot(&ops).await.unwrap();
        let point = ledger.create_undo_point(ops, snapshot, "mixed").await.unwrap();

        let narrowed = ledger
            .retain_applied(point.id, &[first, kept])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(narrowed.operations.len(), 2);
        assert_eq!(narrowed.snapshot.inverse_commands, vec!["undo-first"]);
        assert_eq!(narrowed.snapshot.files.len(), 1);
        assert!(narrowed.snapshot.covers(&dir.path().join("kept.txt")));
        assert_eq!(
            ledger.undo_history().await[0].snapshot,
            narrowed.snapshot
        );

        assert!(ledger.retain_applied(point.id, &[]).await.unwrap().is_none());
        assert!(ledger.undo_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_most_recent_first() {
        let (_dir, ledger) = ledger(LedgerOptions::default().with_max_undo_points(2));
        for name in ["one", "two", "three"] {
            let ops = vec![Operation::file_create(format!("{name}.txt"), name)];
            let snapshot = ledger.capture_snapshot(&ops).await.unwrap();
            ledger.create_undo_point(ops, snapshot, name).await.unwrap();
        }
        let history: Vec<_> = ledger
            .undo_history()
            .await
            .into_iter()
            .map(|p| p.description)
            .collect();
        assert_eq!(history, vec!["three", "two"]);
        assert!(
            ledger.undo_history().await[0].operations[0].kind == OperationKind::FileCreate
        );
    }
}
