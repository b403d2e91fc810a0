//! Content-addressed blob area for file backups.

use rampart_core::ContentHash;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::atomic::write_atomic;
use crate::error::{StorageError, StorageResult};

/// Blobs stored as `{root}/{hex-hash}`.
///
/// Identical content is stored once. Callers decide when a blob is no longer
/// referenced and call [`BlobStore::remove`] or [`BlobStore::retain`].
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Blob store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.to_hex())
    }

    /// Store `data` and return its hash. Existing blobs are not rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be written.
    pub fn put(&self, data: &[u8]) -> StorageResult<ContentHash> {
        let hash = ContentHash::hash(data);
        let path = self.path_for(&hash);
        if !path.exists() {
            write_atomic(&path, data)?;
            tracing::trace!(blob = %hash.short(), bytes = data.len(), "stored blob");
        }
        Ok(hash)
    }

    /// Read a blob and verify its content against the hash.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BlobMissing`] if it does not exist and
    /// [`StorageError::Corrupted`] if the content no longer matches.
    pub fn get(&self, hash: &ContentHash) -> StorageResult<Vec<u8>> {
        let path = self.path_for(hash);
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::BlobMissing(hash.to_hex()));
            },
            Err(e) => return Err(StorageError::io(&path, e)),
        };
        if ContentHash::hash(&data) != *hash {
            return Err(StorageError::Corrupted {
                path,
                line: 0,
                reason: "blob content does not match its hash".to_string(),
            });
        }
        Ok(data)
    }

    /// Whether a blob exists.
    #[must_use]
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.path_for(hash).exists()
    }

    /// Delete a blob. Missing blobs are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing blob cannot be removed.
    pub fn remove(&self, hash: &ContentHash) -> StorageResult<()> {
        let path = self.path_for(hash);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    /// Delete every blob not in `live`. Returns the number removed.
    ///
    /// Files whose names are not blob hashes are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or a blob cannot
    /// be removed.
    pub fn retain(&self, live: &HashSet<ContentHash>) -> StorageResult<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io(&self.root, e)),
        };
        let mut removed = 0_usize;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.root, e))?;
            let name = entry.file_name();
            let Some(hash) = name.to_str().and_then(|n| ContentHash::from_hex(n).ok()) else {
                continue;
            };
            if !live.contains(&hash) {
                self.remove(&hash)?;
                removed = removed.saturating_add(1);
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "removed unreferenced blobs");
        }
        Ok(removed)
    }
}
