//! Inter-process store lock.

use fs2::FileExt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StorageError, StorageResult};

/// Exclusive advisory lock on a store directory, released on drop.
///
/// The store assumes a single writer; a second process opening the same
/// store gets [`StorageError::Locked`] rather than silently interleaving
/// writes.
#[derive(Debug)]
pub struct StoreLock {
    file: fs::File,
    path: PathBuf,
}

impl StoreLock {
    /// Try to take the lock without blocking. Creates the lock file if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another holder has the lock, or
    /// [`StorageError::Io`] if the lock file cannot be opened.
    pub fn try_acquire(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| StorageError::io(path, e))?;
        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }
        tracing::debug!(path = %path.display(), "acquired store lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        }
    }
}
