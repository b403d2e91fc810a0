//! Engine error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the engine facade.
///
/// Expected outcomes (a rejected operation, a failing command, a detected
/// conflict, a fix that did not work) are reported in the returned records.
/// These variants cover broken or locked persisted state and misuse.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] rampart_config::ConfigError),

    /// Approval ledger error.
    #[error(transparent)]
    Ledger(#[from] rampart_approval::LedgerError),

    /// Executor setup error.
    #[error(transparent)]
    Exec(#[from] rampart_exec::ExecError),

    /// Recovery engine error.
    #[error(transparent)]
    Recovery(#[from] rampart_recovery::RecoveryError),

    /// Conflict detection or resolution error.
    #[error(transparent)]
    Conflict(#[from] rampart_conflict::ConflictError),

    /// Persistence error.
    #[error(transparent)]
    Storage(#[from] rampart_storage::StorageError),

    /// Logging setup error.
    #[error("telemetry error: {0}")]
    Telemetry(#[from] rampart_telemetry::TelemetryError),

    /// An operation is malformed.
    #[error(transparent)]
    Core(#[from] rampart_core::CoreError),

    /// A batch cannot be submitted as given.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// A file operation could not be applied.
    #[error("failed to {action} {}: {source}", path.display())]
    Apply {
        /// What was attempted.
        action: &'static str,
        /// The file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
