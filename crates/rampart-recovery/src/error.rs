use rampart_approval::LedgerError;
use rampart_storage::StorageError;

use crate::state::RecoveryState;

/// Errors raised by the recovery engine.
///
/// A fix that runs and fails is a [`FixOutcome`](crate::FixOutcome), not an
/// error. These variants cover broken state and misuse.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// The learned-pattern store failed.
    #[error("learned pattern storage error: {0}")]
    Storage(#[from] StorageError),

    /// The ledger could not back up or record a file fix.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A recovery occurrence tried to move to a state it cannot reach.
    #[error("invalid recovery transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: RecoveryState,
        /// Requested state.
        to: RecoveryState,
    },

    /// Recovery settings are out of range.
    #[error("invalid recovery settings: {0}")]
    InvalidSettings(String),
}

/// Result type for recovery operations.
pub type RecoveryResult<T> = Result<T, RecoveryError>;
