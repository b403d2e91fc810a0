//! Applying approved file operations to disk.

use std::path::Path;

use rampart_core::{Operation, OperationKind};
use rampart_storage::write_atomic;

use crate::error::{EngineError, EngineResult};

/// Writes file operations. Creates and modifications replace the target
/// atomically; deletions remove it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileApplier;

impl FileApplier {
    /// Create an applier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Apply `operation` to the file at `path`.
    ///
    /// `path` is the operation's target resolved against the workspace.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidBatch`] for operations that do not
    /// touch files or carry no content, and [`EngineError::Apply`] or a
    /// storage error when the filesystem refuses the change.
    pub fn apply(&self, operation: &Operation, path: &Path) -> EngineResult<()> {
        match operation.kind {
            OperationKind::FileCreate | OperationKind::FileModify => {
                let content = operation.content.as_deref().ok_or_else(|| {
                    EngineError::InvalidBatch(format!("{} has no content", operation.id))
                })?;
                write_atomic(path, content.as_bytes())?;
            },
            OperationKind::FileDelete => {
                std::fs::remove_file(path).map_err(|source| EngineError::Apply {
                    action: "delete",
                    path: path.to_path_buf(),
                    source,
                })?;
            },
            kind => {
                return Err(EngineError::InvalidBatch(format!(
                    "{kind} is not a file operation"
                )));
            },
        }
        tracing::debug!(
            operation_id = %operation.id,
            kind = %operation.kind,
            path = %path.display(),
            "Applied file operation"
        );
        Ok(())
    }
}
