//! Undo checkpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::hash::ContentHash;
use crate::operation::Operation;
use crate::types::Timestamp;

/// Unique identifier for an undo point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UndoPointId(pub Uuid);

impl UndoPointId {
    /// Create a new random undo point ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UndoPointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UndoPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "undo:{}", self.0)
    }
}

/// Backup of one file taken before it was mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBackup {
    /// Path of the file that was backed up.
    pub path: PathBuf,
    /// Blob holding the prior content. `None` when the file did not exist,
    /// in which case restoring removes it.
    pub original: Option<ContentHash>,
}

impl FileBackup {
    /// Backup of a file that existed with the given content hash.
    #[must_use]
    pub fn existing(path: impl Into<PathBuf>, original: ContentHash) -> Self {
        Self {
            path: path.into(),
            original: Some(original),
        }
    }

    /// Backup of a file that did not exist.
    #[must_use]
    pub fn absent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            original: None,
        }
    }
}

/// Opaque state needed to reverse an undo point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// File backups, one per distinct path.
    #[serde(default)]
    pub files: Vec<FileBackup>,
    /// Operation-specific inverse commands in submission order. Rollback
    /// runs them in reverse.
    #[serde(default)]
    pub inverse_commands: Vec<String>,
    /// Inverse commands already run by an interrupted rollback. They have
    /// been removed from `inverse_commands`.
    #[serde(default)]
    pub completed_inverses: usize,
}

impl Snapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file backup. A second backup for the same path is ignored so
    /// the earliest content wins.
    #[must_use]
    pub fn with_file(mut self, backup: FileBackup) -> Self {
        if !self.covers(&backup.path) {
            self.files.push(backup);
        }
        self
    }

    /// Add an inverse command.
    #[must_use]
    pub fn with_inverse(mut self, command: impl Into<String>) -> Self {
        self.inverse_commands.push(command.into());
        self
    }

    /// Mark the newest pending inverse command as done, returning it.
    pub fn complete_last_inverse(&mut self) -> Option<String> {
        let command = self.inverse_commands.pop()?;
        self.completed_inverses = self.completed_inverses.saturating_add(1);
        Some(command)
    }

    /// Whether an earlier rollback ran some of the inverse commands.
    #[must_use]
    pub fn is_partially_rolled_back(&self) -> bool {
        self.completed_inverses > 0
    }

    /// Whether a backup exists for `path`.
    #[must_use]
    pub fn covers(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    /// Blob hashes referenced by this snapshot.
    pub fn blobs(&self) -> impl Iterator<Item = &ContentHash> {
        self.files.iter().filter_map(|f| f.original.as_ref())
    }

    /// Whether the snapshot restores nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.inverse_commands.is_empty()
    }
}

/// An ordered checkpoint bundling operations with the state to reverse them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoPoint {
    /// Unique identifier.
    pub id: UndoPointId,
    /// Operations applied since the previous checkpoint, in order.
    pub operations: Vec<Operation>,
    /// State captured before the operations were applied.
    pub snapshot: Snapshot,
    /// Human-readable description.
    pub description: String,
    /// When the checkpoint was taken.
    pub created_at: Timestamp,
}

impl UndoPoint {
    /// Create a new undo point.
    #[must_use]
    pub fn new(
        operations: Vec<Operation>,
        snapshot: Snapshot,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: UndoPointId::new(),
            operations,
            snapshot,
            description: description.into(),
            created_at: Timestamp::now(),
        }
    }
}

impl fmt::Display for UndoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} \"{}\" ({} operations, {} files)",
            self.id,
            self.description,
            self.operations.len(),
            self.snapshot.files.len()
        )
    }
}
