//! Batch submission, conflict handling and rollback.

use async_trait::async_trait;
use rampart_approval::{INVERSE_METADATA_KEY, RollbackHook};
use rampart_conflict::{Conflict, Resolution, resolve_conflict};
use rampart_core::{
    CommandResult, Decision, Operation, OperationId, OperationKind, RiskTier, UndoPoint,
    UndoPointId,
};
use rampart_exec::{CommandExecutor, ExecOptions};
use std::sync::Arc;
use tracing::Instrument;

use super::Engine;
use crate::error::{EngineError, EngineResult};

/// What happened to one operation of a batch.
#[derive(Debug, Clone)]
pub enum OperationOutcome {
    /// The file operation was written.
    Applied,
    /// The command ran. Its status says how it went.
    Executed(CommandResult),
    /// The file operation was approved but could not be written.
    WriteFailed {
        /// Filesystem error.
        reason: String,
    },
    /// The operation was not approved and did not run.
    NotApproved {
        /// Decision recorded on the operation.
        decision: Decision,
        /// Why, quoting the matched risk rule or the decision source.
        reason: String,
    },
    /// An earlier operation of the batch failed, so this one did not run.
    Skipped,
}

impl OperationOutcome {
    /// Whether the operation took effect: written, or run successfully.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        match self {
            Self::Applied => true,
            Self::Executed(result) => result.is_success(),
            _ => false,
        }
    }
}

/// An operation with its decision recorded and what became of it.
#[derive(Debug, Clone)]
pub struct OperationReport {
    /// The operation as decided.
    pub operation: Operation,
    /// What happened.
    pub outcome: OperationOutcome,
}

/// Result of [`Engine::submit_batch`].
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One entry per submitted operation, in submission order.
    pub operations: Vec<OperationReport>,
    /// Conflicts found during preflight. Operations they reference were
    /// deferred.
    pub conflicts: Vec<Conflict>,
    /// Undo point recorded before anything was applied, if the batch
    /// contained approved reversible work. After a halt it covers only the
    /// operations that took effect, and is dropped if none did.
    pub undo_point: Option<UndoPointId>,
}

impl BatchReport {
    /// Whether every operation took effect.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.operations.iter().all(|r| r.outcome.succeeded())
    }

    /// Number of operations that took effect.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.operations
            .iter()
            .filter(|r| r.outcome.succeeded())
            .count()
    }

    /// Outcome of the operation with `id`.
    #[must_use]
    pub fn outcome(&self, id: OperationId) -> Option<&OperationOutcome> {
        self.operations
            .iter()
            .find(|r| r.operation.id == id)
            .map(|r| &r.outcome)
    }

    /// The operations, decisions included, for resolving conflicts and
    /// submitting again.
    #[must_use]
    pub fn into_operations(self) -> Vec<Operation> {
        self.operations.into_iter().map(|r| r.operation).collect()
    }
}

fn validate_batch(operations: &[Operation]) -> EngineResult<()> {
    if operations.is_empty() {
        return Err(EngineError::InvalidBatch(
            "a batch needs at least one operation".to_string(),
        ));
    }
    for operation in operations {
        if operation.kind == OperationKind::Batch {
            return Err(EngineError::InvalidBatch(format!(
                "{} is a batch record; submit its members instead",
                operation.id
            )));
        }
        operation.validate()?;
    }
    Ok(())
}

fn is_reversible(operation: &Operation) -> bool {
    operation.kind.mutates_file() || operation.metadata.contains_key(INVERSE_METADATA_KEY)
}

impl Engine {
    /// Run the conflict detector over `operations` against the workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the disk cannot be read.
    pub fn detect_conflicts(&self, operations: &[Operation]) -> EngineResult<Vec<Conflict>> {
        Ok(self.detector.detect(operations, &self.disk)?)
    }

    /// Apply `resolution` to `batch` and mark `conflict` resolved.
    ///
    /// # Errors
    ///
    /// Returns an error if the conflict is already resolved, names
    /// operations not in the batch, or cannot be resolved that way.
    pub fn resolve_conflict(
        &self,
        batch: &mut Vec<Operation>,
        conflict: &mut Conflict,
        resolution: &Resolution,
    ) -> EngineResult<()> {
        resolve_conflict(batch, conflict, resolution, &self.disk)?;
        Ok(())
    }

    /// Submit a single operation. Same as a batch of one.
    ///
    /// # Errors
    ///
    /// See [`submit_batch`](Self::submit_batch).
    pub async fn submit_operation(
        &self,
        operation: Operation,
        options: &ExecOptions,
    ) -> EngineResult<BatchReport> {
        self.submit_batch(vec![operation], options).await
    }

    /// Decide and apply a batch.
    ///
    /// Conflicts are detected first; operations they reference are deferred.
    /// Every operation is then decided in submission order. DANGEROUS
    /// commands are rejected without asking unless
    /// `options.dangerous_override` is set. If any approved operation
    /// writes a file or carries an inverse command, an undo point covering
    /// the approved operations is recorded before anything is applied.
    /// Approved operations then run in submission order; the first one that
    /// fails stops the batch and the rest are skipped. The undo point is
    /// then narrowed to what took effect, so undoing a halted batch never
    /// runs the inverse of a command that failed or never ran.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or malformed batch, or if the ledger
    /// cannot record a decision or the undo point. Rejections, conflicts and
    /// failing commands are reported in the [`BatchReport`].
    pub async fn submit_batch(
        &self,
        operations: Vec<Operation>,
        options: &ExecOptions,
    ) -> EngineResult<BatchReport> {
        let context = self
            .context("runtime", "submit_batch")
            .with_metadata("operations", operations.len().to_string());
        self.run_batch(operations, options)
            .instrument(context.span())
            .await
    }

    async fn run_batch(
        &self,
        mut operations: Vec<Operation>,
        options: &ExecOptions,
    ) -> EngineResult<BatchReport> {
        validate_batch(&operations)?;
        let conflicts = self.detect_conflicts(&operations)?;
        if !conflicts.is_empty() {
            tracing::warn!(
                conflicts = conflicts.len(),
                "Batch has unresolved conflicts, deferring the operations involved"
            );
        }

        let mut refusals = Vec::with_capacity(operations.len());
        for operation in &mut operations {
            refusals.push(self.decide(operation, &conflicts, options).await?);
        }

        let approved: Vec<Operation> = operations
            .iter()
            .zip(&refusals)
            .filter(|(_, refusal)| refusal.is_none())
            .map(|(operation, _)| operation.clone())
            .collect();
        let undo_point = if approved.iter().any(is_reversible) {
            let snapshot = self.ledger.capture_snapshot(&approved).await?;
            let description = describe(&approved);
            let point = self
                .ledger
                .create_undo_point(approved, snapshot, description)
                .await?;
            tracing::debug!(undo_point = %point.id, "Recorded undo point");
            Some(point.id)
        } else {
            None
        };

        let mut reports = Vec::with_capacity(operations.len());
        let mut halted = false;
        for (mut operation, refusal) in operations.into_iter().zip(refusals) {
            let outcome = match refusal {
                Some(reason) => OperationOutcome::NotApproved {
                    decision: operation.decision(),
                    reason,
                },
                None if halted => OperationOutcome::Skipped,
                None => {
                    let outcome = self.apply(&mut operation, options).await;
                    halted = !outcome.succeeded();
                    outcome
                },
            };
            reports.push(OperationReport { operation, outcome });
        }

        let undo_point = match undo_point {
            Some(id) if halted => {
                let applied: Vec<OperationId> = reports
                    .iter()
                    .filter(|r| r.outcome.succeeded())
                    .map(|r| r.operation.id)
                    .collect();
                self.ledger
                    .retain_applied(id, &applied)
                    .await?
                    .map(|point| point.id)
            },
            other => other,
        };

        let report = BatchReport {
            operations: reports,
            conflicts,
            undo_point,
        };
        tracing::info!(
            operations = report.operations.len(),
            succeeded = report.succeeded(),
            conflicts = report.conflicts.len(),
            undo_point = ?report.undo_point,
            "Batch finished"
        );
        Ok(report)
    }

    /// Decide one operation. `None` means approved, otherwise why not.
    async fn decide(
        &self,
        operation: &mut Operation,
        conflicts: &[Conflict],
        options: &ExecOptions,
    ) -> EngineResult<Option<String>> {
        if operation.kind == OperationKind::CommandExecute && !options.dangerous_override {
            let assessment = self.ledger.classifier().assess(&operation.target);
            if assessment.tier == RiskTier::Dangerous {
                operation.risk = RiskTier::Dangerous;
                if !operation.decision().is_final() {
                    operation.record_decision(Decision::Rejected)?;
                }
                let rule = assessment.matched_rule.as_deref().unwrap_or("dangerous");
                tracing::warn!(
                    operation_id = %operation.id,
                    command = %operation.target,
                    rule,
                    "Dangerous command rejected without override"
                );
                return Ok(Some(format!(
                    "dangerous command requires an explicit override; matched rule '{rule}': {}",
                    assessment.reason
                )));
            }
        }

        let outcome = self.ledger.check_approval(operation, conflicts).await?;
        Ok((!outcome.is_approved()).then(|| outcome.explain()))
    }

    async fn apply(&self, operation: &mut Operation, options: &ExecOptions) -> OperationOutcome {
        if operation.kind == OperationKind::CommandExecute {
            let result = self
                .executor
                .execute_operation(operation, options, None)
                .await;
            return OperationOutcome::Executed(result);
        }
        let path = self.ledger.resolve(operation.target_path());
        match self.applier.apply(operation, &path) {
            Ok(()) => OperationOutcome::Applied,
            Err(e) => {
                tracing::warn!(
                    operation_id = %operation.id,
                    path = %path.display(),
                    error = %e,
                    "File operation failed"
                );
                OperationOutcome::WriteFailed {
                    reason: e.to_string(),
                }
            },
        }
    }

    /// Roll back the most recent undo point through `hook`.
    ///
    /// Returns `false` when there is nothing to roll back, the hook vetoes,
    /// or the first inverse command fails.
    ///
    /// # Errors
    ///
    /// Returns an error if an inverse fails after others ran (a later call
    /// resumes from it), a file cannot be restored (restored files are
    /// reverted) or a backup is missing.
    pub async fn rollback(&self, hook: &dyn RollbackHook) -> EngineResult<bool> {
        let context = self.context("runtime", "rollback");
        Ok(self.ledger.rollback(hook).instrument(context.span()).await?)
    }

    /// Roll back the most recent undo point, running inverse commands
    /// through the executor.
    ///
    /// # Errors
    ///
    /// See [`rollback`](Self::rollback).
    pub async fn undo(&self) -> EngineResult<bool> {
        self.rollback(&ExecutorRollback::new(Arc::clone(&self.executor)))
            .await
    }
}

fn describe(operations: &[Operation]) -> String {
    match operations {
        [single] => single.description.clone(),
        _ => format!("batch of {} operations", operations.len()),
    }
}

/// A [`RollbackHook`] that confirms every rollback and runs inverse
/// commands through the executor, so they pass the same approval gate as
/// any other command.
pub struct ExecutorRollback {
    executor: Arc<CommandExecutor>,
    options: ExecOptions,
}

impl ExecutorRollback {
    /// Run inverses through `executor` with default options.
    #[must_use]
    pub fn new(executor: Arc<CommandExecutor>) -> Self {
        Self {
            executor,
            options: ExecOptions::new(),
        }
    }

    /// Options for the inverse commands.
    #[must_use]
    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl RollbackHook for ExecutorRollback {
    async fn confirm(&self, point: &UndoPoint) -> bool {
        tracing::debug!(undo_point = %point.id, "Rolling back");
        true
    }

    async fn run_inverse(&self, command: &str) -> bool {
        let options = self
            .options
            .clone()
            .with_description(format!("undo: {command}"));
        let result = self.executor.execute(command, &options, None).await;
        if !result.is_success() {
            tracing::warn!(command, status = %result.status, "Inverse command failed");
        }
        result.is_success()
    }
}

impl std::fmt::Debug for ExecutorRollback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRollback")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
