//! Error types for conflict detection and resolution.

use rampart_core::OperationId;
use std::path::PathBuf;
use thiserror::Error;

use crate::conflict::ConflictKind;

/// Errors raised while inspecting disk state or applying a resolution.
///
/// A detected conflict is not an error; it is returned as data.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The disk state could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path being checksummed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A resolution named an operation that is not in the batch.
    #[error("operation {0} is not part of the batch")]
    UnknownOperation(OperationId),

    /// The resolution cannot be applied to this kind of conflict.
    #[error("{resolution} cannot resolve a {kind} conflict")]
    UnsupportedResolution {
        /// Kind of the conflict.
        kind: ConflictKind,
        /// Name of the attempted resolution.
        resolution: String,
    },

    /// The conflict was already resolved.
    #[error("conflict {0} is already resolved")]
    AlreadyResolved(String),
}

/// Result type for conflict operations.
pub type ConflictResult<T> = Result<T, ConflictError>;
