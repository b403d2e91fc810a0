//! Persistent undo history.
//!
//! Layout under the state directory:
//!
//! ```text
//! undo/LOCK          exclusive lock held while the store is open
//! undo/log.jsonl     Push / Amend / Pop / Prune records, append-then-compact
//! undo/blobs/        content-addressed file backups
//! ```

use rampart_core::{ContentHash, FileBackup, UndoPoint, UndoPointId};
use rampart_storage::{BlobStore, JsonlLog, StoreLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{LedgerError, LedgerResult};

/// One entry of the undo log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum UndoRecord {
    Push { point: UndoPoint },
    /// Replaces the point with the same id.
    Amend { point: UndoPoint },
    Pop { id: UndoPointId },
    Prune { id: UndoPointId },
}

/// Bounded, persisted stack of undo points.
pub struct UndoStore {
    dir: PathBuf,
    log: JsonlLog<UndoRecord>,
    blobs: BlobStore,
    /// Oldest first.
    points: VecDeque<UndoPoint>,
    max_points: usize,
    dead_records: usize,
    _lock: StoreLock,
}

impl UndoStore {
    /// Open the store under `state_dir/undo`, replaying its log.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`](rampart_storage::StorageError::Locked)
    /// if another process has the store open, or
    /// [`StorageError::Corrupted`](rampart_storage::StorageError::Corrupted)
    /// if the log is damaged before its last record.
    pub fn open(state_dir: &Path, max_points: usize) -> LedgerResult<Self> {
        let dir = state_dir.join("undo");
        let lock = StoreLock::try_acquire(&dir.join("LOCK"))?;
        let log = JsonlLog::new(dir.join("log.jsonl"));

        let records = log.load()?;
        let record_count = records.len();
        let mut points: VecDeque<UndoPoint> = VecDeque::new();
        for record in records {
            match record {
                UndoRecord::Push { point } => points.push_back(point),
                UndoRecord::Amend { point } => {
                    match points.iter_mut().find(|p| p.id == point.id) {
                        Some(slot) => *slot = point,
                        None => {
                            tracing::warn!(undo_point = %point.id, "Undo log amends an unknown point");
                        },
                    }
                },
                UndoRecord::Pop { id } | UndoRecord::Prune { id } => {
                    let before = points.len();
                    points.retain(|p| p.id != id);
                    if points.len() == before {
                        tracing::warn!(undo_point = %id, "Undo log removes an unknown point");
                    }
                },
            }
        }

        let mut store = Self {
            blobs: BlobStore::new(dir.join("blobs")),
            dir,
            log,
            dead_records: record_count.saturating_sub(points.len()),
            points,
            max_points: max_points.max(1),
            _lock: lock,
        };
        tracing::debug!(
            dir = %store.dir.display(),
            points = store.points.len(),
            "Opened undo store"
        );
        store.enforce_capacity()?;
        store.maybe_compact()?;
        Ok(store)
    }

    /// Back up `path` before it is mutated. The path should be absolute.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::File`] if the file exists but cannot be read.
    pub fn backup(&self, path: &Path) -> LedgerResult<FileBackup> {
        match std::fs::read(path) {
            Ok(content) => {
                let hash = self.blobs.put(&content)?;
                tracing::debug!(path = %path.display(), blob = %hash.short(), "Backed up file");
                Ok(FileBackup::existing(path, hash))
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(FileBackup::absent(path)),
            Err(source) => Err(LedgerError::File {
                action: "back up",
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Record a new most-recent point, pruning the oldest beyond capacity.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log cannot be written. A referenced
    /// blob that is missing is also an error, since the point could never be
    /// rolled back.
    pub fn push(&mut self, point: UndoPoint) -> LedgerResult<()> {
        if let Some(missing) = point.snapshot.blobs().find(|h| !self.blobs.contains(h)) {
            return Err(rampart_storage::StorageError::BlobMissing(missing.to_hex()).into());
        }
        self.log.append(&UndoRecord::Push {
            point: point.clone(),
        })?;
        tracing::info!(undo_point = %point.id, description = %point.description, "Created undo point");
        self.points.push_back(point);
        self.enforce_capacity()?;
        self.maybe_compact()
    }

    /// The most recent point.
    #[must_use]
    pub fn peek(&self) -> Option<&UndoPoint> {
        self.points.back()
    }

    /// Remove and return the most recent point, deleting blobs no other
    /// point references.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log cannot be written.
    pub fn pop(&mut self) -> LedgerResult<Option<UndoPoint>> {
        let Some(point) = self.points.pop_back() else {
            return Ok(None);
        };
        self.log.append(&UndoRecord::Pop { id: point.id })?;
        self.dead_records = self.dead_records.saturating_add(2);
        self.collect_garbage()?;
        self.maybe_compact()?;
        Ok(Some(point))
    }

    /// Replace the held point that has `point.id`.
    ///
    /// Used to record rollback progress and to narrow a point to the
    /// operations that took effect.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`](rampart_core::CoreError::InvalidOperation)
    /// if no such point is held, or a storage error if the log cannot be
    /// written.
    pub fn amend(&mut self, point: UndoPoint) -> LedgerResult<()> {
        let Some(index) = self.points.iter().position(|p| p.id == point.id) else {
            return Err(rampart_core::CoreError::InvalidOperation(format!(
                "{} is not in the undo history",
                point.id
            ))
            .into());
        };
        self.log.append(&UndoRecord::Amend {
            point: point.clone(),
        })?;
        self.dead_records = self.dead_records.saturating_add(1);
        if let Some(slot) = self.points.get_mut(index) {
            *slot = point;
        }
        self.collect_garbage()?;
        self.maybe_compact()
    }

    /// Drop the point with `id`, wherever it sits in the history.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log cannot be written.
    pub fn remove(&mut self, id: UndoPointId) -> LedgerResult<Option<UndoPoint>> {
        let Some(index) = self.points.iter().position(|p| p.id == id) else {
            return Ok(None);
        };
        self.log.append(&UndoRecord::Prune { id })?;
        self.dead_records = self.dead_records.saturating_add(2);
        let removed = self.points.remove(index);
        self.collect_garbage()?;
        self.maybe_compact()?;
        Ok(removed)
    }

    /// Points, most recent first.
    pub fn points(&self) -> impl Iterator<Item = &UndoPoint> {
        self.points.iter().rev()
    }

    /// Number of points held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Capacity.
    #[must_use]
    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Content of a backup blob.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BlobMissing`](rampart_storage::StorageError::BlobMissing)
    /// if the blob is gone.
    pub fn read_blob(&self, hash: &ContentHash) -> LedgerResult<Vec<u8>> {
        Ok(self.blobs.get(hash)?)
    }

    fn enforce_capacity(&mut self) -> LedgerResult<()> {
        let mut pruned = false;
        while self.points.len() > self.max_points {
            let Some(oldest) = self.points.pop_front() else {
                break;
            };
            self.log.append(&UndoRecord::Prune { id: oldest.id })?;
            self.dead_records = self.dead_records.saturating_add(2);
            tracing::debug!(undo_point = %oldest.id, "Pruned oldest undo point");
            pruned = true;
        }
        if pruned {
            self.collect_garbage()?;
        }
        Ok(())
    }

    fn collect_garbage(&self) -> LedgerResult<()> {
        let live: HashSet<ContentHash> = self
            .points
            .iter()
            .flat_map(|p| p.snapshot.blobs().copied())
            .collect();
        let removed = self.blobs.retain(&live)?;
        if removed > 0 {
            tracing::debug!(removed, "Removed unreferenced backups");
        }
        Ok(())
    }

    fn maybe_compact(&mut self) -> LedgerResult<()> {
        if self.dead_records <= self.points.len() {
            return Ok(());
        }
        let records: Vec<UndoRecord> = self
            .points
            .iter()
            .map(|point| UndoRecord::Push {
                point: point.clone(),
            })
            .collect();
        self.log.rewrite(&records)?;
        tracing::debug!(
            live = records.len(),
            dropped = self.dead_records,
            "Compacted undo log"
        );
        self.dead_records = 0;
        Ok(())
    }
}

impl fmt::Debug for UndoStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoStore")
            .field("dir", &self.dir)
            .field("points", &self.points.len())
            .field("max_points", &self.max_points)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::{Operation, Snapshot};
    use rampart_storage::StorageError;

    fn point_for(store: &UndoStore, path: &Path, description: &str) -> UndoPoint {
        let backup = store.backup(path).unwrap();
        UndoPoint::new(
            vec![Operation::file_modify(path.display().to_string(), "new")],
            Snapshot::new().with_file(backup),
            description,
        )
    }

    #[test]
    fn test_backup_existing_and_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = UndoStore::open(dir.path(), 5).unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"original").unwrap();

        let backup = store.backup(&file).unwrap();
        let hash = backup.original.unwrap();
        assert_eq!(store.read_blob(&hash).unwrap(), b"original");

        let absent = store.backup(&dir.path().join("missing.txt")).unwrap();
        assert!(absent.original.is_none());
    }

    #[test]
    fn test_push_pop_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UndoStore::open(dir.path(), 5).unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"v1").unwrap();
        let first = point_for(&store, &file, "first");
        store.push(first.clone()).unwrap();
        std::fs::write(&file, b"v2").unwrap();
        let second = point_for(&store, &file, "second");
        store.push(second.clone()).unwrap();

        let order: Vec<_> = store.points().map(|p| p.description.clone()).collect();
        assert_eq!(order, vec!["second", "first"]);
        assert_eq!(store.peek().unwrap().id, second.id);
        assert_eq!(store.pop().unwrap().unwrap().id, second.id);
        assert_eq!(store.pop().unwrap().unwrap().id, first.id);
        assert!(store.pop().unwrap().is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"v1").unwrap();
        let id = {
            let mut store = UndoStore::open(dir.path(), 5).unwrap();
            let point = point_for(&store, &file, "persisted");
            let id = point.id;
            store.push(point).unwrap();
            id
        };
        let store = UndoStore::open(dir.path(), 5).unwrap();
        assert_eq!(store.len(), 1);
        let point = store.peek().unwrap();
        assert_eq!(point.id, id);
        let hash = point.snapshot.files[0].original.unwrap();
        assert_eq!(store.read_blob(&hash).unwrap(), b"v1");
    }

    #[test]
    fn test_prunes_oldest_and_deletes_its_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UndoStore::open(dir.path(), 2).unwrap();
        let file = dir.path().join("a.txt");
        let mut hashes = Vec::new();
        for i in 0..3 {
            std::fs::write(&file, format!("v{i}")).unwrap();
            let point = point_for(&store, &file, &format!("p{i}"));
            hashes.push(point.snapshot.files[0].original.unwrap());
            store.push(point).unwrap();
        }
        assert_eq!(store.len(), 2);
        let order: Vec<_> = store.points().map(|p| p.description.clone()).collect();
        assert_eq!(order, vec!["p2", "p1"]);
        assert!(store.read_blob(&hashes[0]).is_err());
        assert_eq!(store.read_blob(&hashes[1]).unwrap(), b"v1");
    }

    #[test]
    fn test_shared_blob_kept_while_referenced() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UndoStore::open(dir.path(), 5).unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"same").unwrap();
        let first = point_for(&store, &file, "first");
        let second = point_for(&store, &file, "second");
        let hash = second.snapshot.files[0].original.unwrap();
        store.push(first).unwrap();
        store.push(second).unwrap();
        store.pop().unwrap();
        assert_eq!(store.read_blob(&hash).unwrap(), b"same");
    }

    #[test]
    fn test_lowered_capacity_prunes_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();
        {
            let mut store = UndoStore::open(dir.path(), 5).unwrap();
            for i in 0..4 {
                let point = point_for(&store, &file, &format!("p{i}"));
                store.push(point).unwrap();
            }
        }
        let store = UndoStore::open(dir.path(), 2).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.peek().unwrap().description, "p3");
    }

    #[test]
    fn test_compaction_keeps_live_points() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();
        {
            let mut store = UndoStore::open(dir.path(), 10).unwrap();
            let keep = point_for(&store, &file, "keep");
            store.push(keep).unwrap();
            for i in 0..3 {
                let point = point_for(&store, &file, &format!("tmp{i}"));
                store.push(point).unwrap();
                store.pop().unwrap();
            }
        }
        let log = std::fs::read_to_string(dir.path().join("undo/log.jsonl")).unwrap();
        assert!(log.lines().count() <= 3);
        let store = UndoStore::open(dir.path(), 10).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.peek().unwrap().description, "keep");
    }

    #[test]
    fn test_amend_replaces_point_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"v1").unwrap();
        let id = {
            let mut store = UndoStore::open(dir.path(), 5).unwrap();
            let mut point = point_for(&store, &file, "two inverses");
            point.snapshot = point
                .snapshot
                .with_inverse("undo-first")
                .with_inverse("undo-second");
            store.push(point.clone()).unwrap();

            point.snapshot.complete_last_inverse();
            store.amend(point.clone()).unwrap();
            assert_eq!(
                store.peek().unwrap().snapshot.inverse_commands,
                vec!["undo-first"]
            );
            point.id
        };

        let store = UndoStore::open(dir.path(), 5).unwrap();
        let point = store.peek().unwrap();
        assert_eq!(point.id, id);
        assert_eq!(point.snapshot.inverse_commands, vec!["undo-first"]);
        assert_eq!(point.snapshot.completed_inverses, 1);
    }

    #[test]
    fn test_amend_unknown_point_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UndoStore::open(dir.path(), 5).unwrap();
        let stray = UndoPoint::new(Vec::new(), Snapshot::new().with_inverse("x"), "stray");
        assert!(store.amend(stray).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_drops_point_and_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UndoStore::open(dir.path(), 5).unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"only here").unwrap();
        let point = point_for(&store, &file, "dropped");
        let hash = point.snapshot.files[0].original.unwrap();
        let id = point.id;
        store.push(point).unwrap();

        assert_eq!(store.remove(id).unwrap().unwrap().id, id);
        assert!(store.is_empty());
        assert!(store.read_blob(&hash).is_err());
        assert!(store.remove(id).unwrap().is_none());
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let _store = UndoStore::open(dir.path(), 5).unwrap();
        let err = UndoStore::open(dir.path(), 5).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Storage(StorageError::Locked(_))
        ));
    }

    #[test]
    fn test_push_rejects_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UndoStore::open(dir.path(), 5).unwrap();
        let point = UndoPoint::new(
            Vec::new(),
            Snapshot::new().with_file(FileBackup::existing("x", ContentHash::hash(b"gone"))),
            "bad",
        );
        assert!(matches!(
            store.push(point).unwrap_err(),
            LedgerError::Storage(StorageError::BlobMissing(_))
        ));
        assert!(store.is_empty());
    }
}
