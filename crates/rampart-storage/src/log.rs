//! Append-then-compact JSON-lines log.
//!
//! Records are appended one per line and fsynced. Compaction rewrites the
//! whole file through [`write_atomic`](crate::write_atomic), so a crash
//! leaves either the old log or the new one. A crash during an append can
//! leave a torn final line; [`JsonlLog::load`] skips it with a warning. A
//! malformed line anywhere else means the file was damaged by something
//! other than a crash and is reported as [`StorageError::Corrupted`].

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::atomic::write_atomic;
use crate::error::{StorageError, StorageResult};

/// A typed JSON-lines log file.
#[derive(Debug, Clone)]
pub struct JsonlLog<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonlLog<T> {
    /// Log backed by `path`. The file is created on first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if a line other than the last one
    /// fails to parse.
    pub fn load(&self) -> StorageResult<Vec<T>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .collect();
        let last_index = lines.len().saturating_sub(1);

        let mut records = Vec::with_capacity(lines.len());
        for (pos, (line_no, line)) in lines.iter().enumerate() {
            match serde_json::from_str::<T>(line) {
                Ok(record) => records.push(record),
                Err(e) if pos == last_index && !text.ends_with('\n') => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = line_no.saturating_add(1),
                        error = %e,
                        "skipping torn trailing record"
                    );
                },
                Err(e) => {
                    return Err(StorageError::Corrupted {
                        path: self.path.clone(),
                        line: line_no.saturating_add(1),
                        reason: e.to_string(),
                    });
                },
            }
        }
        Ok(records)
    }

    /// Append one record and sync it to disk.
    ///
    /// A torn trailing line left by an earlier crash is truncated first so
    /// the new record starts on its own line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn append(&self, record: &T) -> StorageResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        let torn_at = match fs::read(&self.path) {
            Ok(existing) if existing.last().is_some_and(|b| *b != b'\n') => Some(
                existing
                    .iter()
                    .rposition(|b| *b == b'\n')
                    .map_or(0, |i| i.saturating_add(1)),
            ),
            Ok(_) => None,
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        if let Some(len) = torn_at {
            tracing::warn!(path = %self.path.display(), "truncating torn trailing record");
            file.set_len(len as u64)
                .map_err(|e| StorageError::io(&self.path, e))?;
        }
        file.write_all(line.as_bytes())
            .map_err(|e| StorageError::io(&self.path, e))?;
        file.sync_data()
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(())
    }

    /// Replace the whole log with `records`, atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the atomic write fails.
    pub fn rewrite(&self, records: &[T]) -> StorageResult<()> {
        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }
        write_atomic(&self.path, buf.as_bytes())?;
        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "compacted log"
        );
        Ok(())
    }
}
