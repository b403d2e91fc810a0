use rampart_approval::LedgerError;
use rampart_storage::StorageError;

/// Errors raised while setting up the executor.
///
/// Running a command never returns an error: spawn failures, timeouts and
/// blocked commands are reported through [`ExecutionStatus`](rampart_core::ExecutionStatus).
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The history file could not be read or written.
    #[error("history storage error: {0}")]
    Storage(#[from] StorageError),

    /// The approval ledger failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Executor settings are unusable.
    #[error("invalid executor config: {0}")]
    InvalidConfig(String),
}

/// Result type for executor setup.
pub type ExecResult<T> = Result<T, ExecError>;
