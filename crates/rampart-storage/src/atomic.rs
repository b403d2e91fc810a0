//! Whole-file atomic replacement.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use crate::error::{StorageError, StorageResult};

/// Write `data` to `path` atomically: write a temp file in the same
/// directory, flush it to disk, then rename over the target.
///
/// # Errors
///
/// Returns [`StorageError::Io`] if the directory cannot be created or the
/// temp file cannot be written or persisted.
pub fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| StorageError::io(parent, e))?;
    tmp.write_all(data).map_err(|e| StorageError::io(path, e))?;
    tmp.flush().map_err(|e| StorageError::io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StorageError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
///
/// # Errors
///
/// Returns an error if serialization or the atomic write fails.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Read a JSON file. Returns `Ok(None)` when it does not exist.
///
/// # Errors
///
/// Returns [`StorageError::Corrupted`] if the file exists but does not parse.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StorageError::Corrupted {
            path: path.to_path_buf(),
            line: e.line(),
            reason: e.to_string(),
        })
}
