//! The engine facade - one handle over every component.
//!
//! [`Engine::open`] wires the approval ledger, executor, conflict detector
//! and recovery engine from a [`Config`] for a single workspace. Upstream
//! layers talk only to this type.

use rampart_approval::{ApprovalHandler, ApprovalLedger};
use rampart_config::Config;
use rampart_conflict::{ConflictDetector, FsDiskState};
use rampart_core::{RetryConfig, UndoPoint};
use rampart_exec::{CommandExecutor, ExecutionStats};
use rampart_recovery::{
    ErrorAnalyzer, InteractiveRecoveryAssistant, LearnedStore, RecoveryDecider, RecoveryEngine,
};
use rampart_telemetry::OperationContext;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::applier::FileApplier;
use crate::config_bridge::{
    LEARNED_FILE, to_executor_config, to_ledger_options, to_recovery_settings, to_retry_config,
    to_risk_classifier,
};
use crate::error::EngineResult;

mod execution;
mod operations;


pub use operations::{BatchReport, ExecutorRollback, OperationOutcome, OperationReport};

/// Safety-gated execution and recovery for one workspace.
pub struct Engine {
    /// Effective configuration.
    pub(super) config: Config,
    /// Root that relative targets resolve against.
    pub(super) workspace_root: PathBuf,
    /// Where persistent state lives.
    pub(super) state_dir: PathBuf,
    /// Approval decisions, preferences and undo history.
    pub(super) ledger: Arc<ApprovalLedger>,
    /// Process execution.
    pub(super) executor: Arc<CommandExecutor>,
    /// Failure analysis, fixes and learning.
    pub(super) recovery: Arc<RecoveryEngine>,
    /// Batch preflight.
    pub(super) detector: ConflictDetector,
    /// On-disk view for the detector.
    pub(super) disk: FsDiskState,
    /// Writes approved file operations.
    pub(super) applier: FileApplier,
    /// Backoff for [`Engine::execute_with_retry`].
    pub(super) retry: RetryConfig,
    /// Correlates every span this engine emits.
    pub(super) session_id: Uuid,
}

impl Engine {
    /// Open the engine for `workspace_root` with an explicit configuration.
    ///
    /// State (undo history, preferences, learned patterns and, if enabled,
    /// command history) lives in the configured state directory. Each store
    /// takes an exclusive lock, so a second engine on the same state fails
    /// here instead of sharing it.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured pattern is invalid, a store is
    /// locked by another process, or persisted state is corrupted.
    pub fn open(config: Config, workspace_root: impl Into<PathBuf>) -> EngineResult<Self> {
        let workspace_root = workspace_root.into();
        let state_dir = config.storage.resolve_state_dir(&workspace_root);

        let ledger = Arc::new(ApprovalLedger::open(
            &state_dir,
            workspace_root.clone(),
            to_risk_classifier(&config)?,
            to_ledger_options(&config),
        )?);
        let analyzer = ErrorAnalyzer::new().with_base_dir(workspace_root.clone());
        let executor = Arc::new(
            CommandExecutor::new(
                Arc::clone(&ledger),
                to_executor_config(&config, &workspace_root, &state_dir),
            )?
            .with_analyzer(Arc::new(analyzer)),
        );
        let settings = to_recovery_settings(&config);
        let store = LearnedStore::open(state_dir.join(LEARNED_FILE), &settings)?;
        let recovery = Arc::new(RecoveryEngine::new(
            Arc::clone(&executor),
            store,
            settings,
        )?);

        let session_id = Uuid::new_v4();
        tracing::info!(
            %session_id,
            workspace_root = %workspace_root.display(),
            state_dir = %state_dir.display(),
            auto_approve_safe = config.approval.auto_approve_safe,
            "Engine opened"
        );

        Ok(Self {
            disk: FsDiskState::new(workspace_root.clone()),
            retry: to_retry_config(&config),
            config,
            workspace_root,
            state_dir,
            ledger,
            executor,
            recovery,
            detector: ConflictDetector::new(),
            applier: FileApplier::new(),
            session_id,
        })
    }

    /// Load the layered configuration for `workspace_root` and open the
    /// engine with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or the engine
    /// cannot be opened.
    pub fn load(workspace_root: impl Into<PathBuf>) -> EngineResult<Self> {
        let workspace_root = workspace_root.into();
        let resolved = Config::load(Some(&workspace_root))?;
        tracing::debug!(files = ?resolved.loaded_files, "Configuration loaded");
        Self::open(resolved.config, workspace_root)
    }

    /// Register the human approval handler.
    pub async fn register_handler(&self, handler: Arc<dyn ApprovalHandler>) {
        self.ledger.register_handler(handler).await;
    }

    /// An interactive recovery assistant over this engine's recovery engine.
    #[must_use]
    pub fn assistant(&self, decider: Arc<dyn RecoveryDecider>) -> InteractiveRecoveryAssistant {
        InteractiveRecoveryAssistant::new(Arc::clone(&self.recovery), decider)
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Workspace root.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// State directory.
    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// The approval ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<ApprovalLedger> {
        &self.ledger
    }

    /// The command executor.
    #[must_use]
    pub fn executor(&self) -> &Arc<CommandExecutor> {
        &self.executor
    }

    /// The recovery engine.
    #[must_use]
    pub fn recovery(&self) -> &Arc<RecoveryEngine> {
        &self.recovery
    }

    /// Backoff used by [`execute_with_retry`](Self::execute_with_retry).
    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Session id attached to every span.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Aggregate statistics over the command history.
    #[must_use]
    pub fn stats(&self) -> ExecutionStats {
        self.executor.stats()
    }

    /// Undo points, most recent first.
    pub async fn undo_history(&self) -> Vec<UndoPoint> {
        self.ledger.undo_history().await
    }

    /// Persist pending learned-pattern updates.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn flush(&self) -> EngineResult<()> {
        Ok(self.recovery.flush()?)
    }

    pub(super) fn context(&self, component: &str, operation: &str) -> OperationContext {
        OperationContext::in_session(self.session_id, component, operation)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("workspace_root", &self.workspace_root)
            .field("state_dir", &self.state_dir)
            .field("session_id", &self.session_id)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}
