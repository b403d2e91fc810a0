use rampart_core::CoreError;
use rampart_storage::StorageError;

/// Errors raised by the ledger.
///
/// Rejections, deferrals and conflicts are decisions, not errors. These
/// variants cover invalid input and persisted state that cannot be trusted.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The undo or preference store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A record was rejected by the data model.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A risk rule or preference pattern does not compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Only approvals and rejections can be remembered.
    #[error("cannot remember a {0} decision")]
    InvalidPreference(String),

    /// A file could not be read for backup or restored.
    #[error("failed to {action} {}: {source}", path.display())]
    File {
        /// What was being done (`back up`, `restore`).
        action: &'static str,
        /// File path.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An inverse command failed after others had already run. The undo
    /// point keeps only the inverses still pending, so a later rollback
    /// resumes where this one stopped.
    #[error(
        "rollback of {point} stopped at '{command}': {completed} inverse commands ran, {remaining} pending"
    )]
    PartialRollback {
        /// Undo point being rolled back.
        point: String,
        /// The inverse command that failed.
        command: String,
        /// Inverse commands run so far, across attempts.
        completed: usize,
        /// Inverse commands still pending, the failed one included.
        remaining: usize,
    },

    /// A rollback could not be completed and was undone.
    #[error("rollback of {point} failed: {reason}")]
    RollbackFailed {
        /// Undo point being rolled back.
        point: String,
        /// What went wrong.
        reason: String,
    },
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
