//! Restoring an undo point.

use async_trait::async_trait;
use rampart_core::{Snapshot, UndoPoint};
use rampart_storage::write_atomic;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{LedgerError, LedgerResult};
use crate::undo::UndoStore;

/// Caller participation in a rollback.
///
/// `confirm` may veto the rollback. `run_inverse` executes one inverse
/// command recorded in the snapshot and reports whether it succeeded.
#[async_trait]
pub trait RollbackHook: Send + Sync {
    /// Whether to roll back `point`.
    async fn confirm(&self, point: &UndoPoint) -> bool;

    /// Run an inverse command. Returning `false` stops the rollback before
    /// any file is touched; inverses that already ran are not run again.
    async fn run_inverse(&self, command: &str) -> bool;
}

/// A hook that confirms every rollback and refuses to run inverse
/// commands, so only pure file snapshots can be restored.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesOnlyRollback;

#[async_trait]
impl RollbackHook for FilesOnlyRollback {
    async fn confirm(&self, _point: &UndoPoint) -> bool {
        true
    }

    async fn run_inverse(&self, command: &str) -> bool {
        tracing::warn!(command, "Refusing inverse command without an executor");
        false
    }
}

struct RestoreEntry {
    path: PathBuf,
    /// Content to restore, `None` to remove the file.
    target: Option<Vec<u8>>,
    /// Content before the rollback, to put back if a later write fails.
    current: Option<Vec<u8>>,
}

/// A rollback with every blob read done up front.
pub(crate) struct StagedRestore {
    entries: Vec<RestoreEntry>,
}

fn read_current(path: &Path) -> LedgerResult<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LedgerError::File {
            action: "read",
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn put(path: &Path, content: Option<&[u8]>) -> LedgerResult<()> {
    match content {
        Some(bytes) => write_atomic(path, bytes)?,
        None => match std::fs::remove_file(path) {
            Ok(()) => {},
            Err(e) if e.kind() == ErrorKind::NotFound => {},
            Err(source) => {
                return Err(LedgerError::File {
                    action: "remove",
                    path: path.to_path_buf(),
                    source,
                });
            },
        },
    }
    Ok(())
}

impl StagedRestore {
    /// Read every backup blob and the current content of every path.
    pub(crate) fn stage(snapshot: &Snapshot, store: &UndoStore) -> LedgerResult<Self> {
        let entries = snapshot
            .files
            .iter()
            .map(|backup| -> LedgerResult<RestoreEntry> {
                let target = backup
                    .original
                    .as_ref()
                    .map(|hash| store.read_blob(hash))
                    .transpose()?;
                Ok(RestoreEntry {
                    current: read_current(&backup.path)?,
                    path: backup.path.clone(),
                    target,
                })
            })
            .collect::<LedgerResult<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Write every file. On failure, files already written are put back.
    pub(crate) fn apply(self, point: &UndoPoint) -> LedgerResult<()> {
        for (done, entry) in self.entries.iter().enumerate() {
            if let Err(e) = put(&entry.path, entry.target.as_deref()) {
                tracing::error!(
                    undo_point = %point.id,
                    path = %entry.path.display(),
                    error = %e,
                    "Rollback write failed, reverting restored files"
                );
                for restored in self.entries.iter().take(done) {
                    if let Err(revert) = put(&restored.path, restored.current.as_deref()) {
                        tracing::error!(
                            path = %restored.path.display(),
                            error = %revert,
                            "Failed to revert restored file"
                        );
                    }
                }
                return Err(LedgerError::RollbackFailed {
                    point: point.id.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Re-read the current content of every path. Called after inverse
    /// commands ran, so a failed write reverts to what they left behind.
    pub(crate) fn refresh_current(&mut self) -> LedgerResult<()> {
        for entry in &mut self.entries {
            entry.current = read_current(&entry.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::{FileBackup, Operation};

    #[tokio::test]
    async fn test_files_only_hook() {
        let hook = FilesOnlyRollback;
        let point = UndoPoint::new(Vec::new(), Snapshot::new(), "noop");
        assert!(hook.confirm(&point).await);
        assert!(!hook.run_inverse("pip uninstall -y requests").await);
    }

    #[test]
    fn test_stage_and_apply_restores_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = UndoStore::open(dir.path(), 5).unwrap();
        let existing = dir.path().join("a.txt");
        let created = dir.path().join("b.txt");
        std::fs::write(&existing, b"before\r\n\x00bytes").unwrap();

        let snapshot = Snapshot::new()
            .with_file(store.backup(&existing).unwrap())
            .with_file(store.backup(&created).unwrap());
        std::fs::write(&existing, b"after").unwrap();
        std::fs::write(&created, b"new file").unwrap();

        let point = UndoPoint::new(
            vec![Operation::file_modify("a.txt", "after")],
            snapshot,
            "edit",
        );
        let staged = StagedRestore::stage(&point.snapshot, &store).unwrap();
        assert_eq!(staged.entries.len(), 2);
        staged.apply(&point).unwrap();

        assert_eq!(std::fs::read(&existing).unwrap(), b"before\r\n\x00bytes");
        assert!(!created.exists());
    }

    #[test]
    fn test_failed_write_reverts_earlier_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        std::fs::write(&first, b"changed").unwrap();
        let plain_file = dir.path().join("plain");
        std::fs::write(&plain_file, b"x").unwrap();

        // The parent of the second path is a regular file, so its write fails.
        let staged = StagedRestore {
            entries: vec![
                RestoreEntry {
                    path: first.clone(),
                    target: Some(b"original".to_vec()),
                    current: Some(b"changed".to_vec()),
                },
                RestoreEntry {
                    path: plain_file.join("child.txt"),
                    target: Some(b"unreachable".to_vec()),
                    current: None,
                },
            ],
        };
        let point = UndoPoint::new(Vec::new(), Snapshot::new(), "partial");
        let err = staged.apply(&point).unwrap_err();
        assert!(matches!(err, LedgerError::RollbackFailed { .. }));
        assert_eq!(std::fs::read(&first).unwrap(), b"changed");
    }

    #[test]
    fn test_refresh_picks_up_changes_since_staging() {
        let dir = tempfile::tempdir().unwrap();
        let store = UndoStore::open(dir.path(), 5).unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"staged").unwrap();
        let snapshot = Snapshot::new().with_file(store.backup(&path).unwrap());

        let mut staged = StagedRestore::stage(&snapshot, &store).unwrap();
        std::fs::write(&path, b"after inverse").unwrap();
        staged.refresh_current().unwrap();
        assert_eq!(
            staged.entries[0].current.as_deref(),
            Some(&b"after inverse"[..])
        );
    }

    #[test]
    fn test_stage_fails_on_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = UndoStore::open(dir.path(), 5).unwrap();
        let snapshot = Snapshot::new().with_file(FileBackup::existing(
            dir.path().join("a.txt"),
            rampart_core::ContentHash::hash(b"never stored"),
        ));
        assert!(StagedRestore::stage(&snapshot, &store).is_err());
    }
}
