//! Persistent store of fix track records.
//!
//! Patterns are keyed by error signature, then by fix signature. Updates
//! are kept in memory and written out every `flush_every` updates, on
//! [`LearnedStore::flush`] and on drop. Writes go through a temp file and
//! an atomic rename. A persisted store holds an exclusive lock so a second
//! process fails fast instead of clobbering it.

use rampart_core::{FixSuggestion, LearnedPattern};
use rampart_storage::{StoreLock, read_json, write_json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::RecoveryResult;
use crate::settings::RecoverySettings;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct LearnedFile {
    version: u32,
    patterns: Vec<LearnedPattern>,
}

#[derive(Default)]
struct Inner {
    patterns: BTreeMap<String, Vec<LearnedPattern>>,
    dirty: u32,
}

struct Persistence {
    path: PathBuf,
    _lock: StoreLock,
}

/// Error signature to fix track record, optionally persisted as JSON.
pub struct LearnedStore {
    inner: Mutex<Inner>,
    persistence: Option<Persistence>,
    alpha: f64,
    flush_every: u32,
}

impl LearnedStore {
    /// A store that lives only in memory.
    #[must_use]
    pub fn in_memory(settings: &RecoverySettings) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            persistence: None,
            alpha: settings.smoothing_factor,
            flush_every: settings.flush_every.max(1),
        }
    }

    /// Open the store at `path`, loading existing patterns.
    ///
    /// # Errors
    ///
    /// Returns a storage error if another process holds the store, or if the
    /// file exists but cannot be parsed.
    pub fn open(path: impl Into<PathBuf>, settings: &RecoverySettings) -> RecoveryResult<Self> {
        let path = path.into();
        let lock = StoreLock::try_acquire(&path.with_extension("lock"))?;
        let mut patterns: BTreeMap<String, Vec<LearnedPattern>> = BTreeMap::new();
        if let Some(file) = read_json::<LearnedFile>(&path)? {
            if file.version != FORMAT_VERSION {
                tracing::warn!(
                    path = %path.display(),
                    version = file.version,
                    "Unexpected learned pattern format version, loading anyway"
                );
            }
            for pattern in file.patterns {
                patterns
                    .entry(pattern.error_signature.clone())
                    .or_default()
                    .push(pattern);
            }
        }
        tracing::debug!(
            path = %path.display(),
            signatures = patterns.len(),
            "Loaded learned patterns"
        );
        Ok(Self {
            inner: Mutex::new(Inner {
                patterns,
                dirty: 0,
            }),
            persistence: Some(Persistence { path, _lock: lock }),
            alpha: settings.smoothing_factor,
            flush_every: settings.flush_every.max(1),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| {
            tracing::warn!("LearnedStore lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Record an outcome of `suggestion` for `error_signature` and return
    /// the updated pattern.
    ///
    /// Flushes once `flush_every` updates have accumulated; a failed flush
    /// is logged and retried on the next one.
    pub fn record(
        &self,
        error_signature: &str,
        suggestion: &FixSuggestion,
        succeeded: bool,
    ) -> LearnedPattern {
        let fix_signature = suggestion.fix_signature();
        let mut inner = self.lock();
        let entries = inner
            .patterns
            .entry(error_signature.to_string())
            .or_default();
        let position = entries
            .iter()
            .position(|p| p.fix_signature == fix_signature)
            .unwrap_or_else(|| {
                entries.push(LearnedPattern::new(error_signature, suggestion.clone()));
                entries.len().saturating_sub(1)
            });
        let updated = entries.get_mut(position).map(|pattern| {
            pattern.record(succeeded, self.alpha);
            pattern.clone()
        });
        inner.dirty = inner.dirty.saturating_add(1);
        let due = inner.dirty >= self.flush_every;

        let updated =
            updated.unwrap_or_else(|| LearnedPattern::new(error_signature, suggestion.clone()));
        tracing::debug!(
            signature = %error_signature,
            fix = %updated.fix_signature,
            succeeded,
            rate = updated.success_rate,
            uses = updated.uses,
            "Recorded fix outcome"
        );
        if due && let Err(e) = self.flush_locked(&mut inner) {
            tracing::warn!(error = %e, "Failed to persist learned patterns");
        }
        updated
    }

    /// All patterns for `error_signature`.
    #[must_use]
    pub fn patterns_for(&self, error_signature: &str) -> Vec<LearnedPattern> {
        self.lock()
            .patterns
            .get(error_signature)
            .cloned()
            .unwrap_or_default()
    }

    /// Patterns for `error_signature` that meet the thresholds, best first.
    #[must_use]
    pub fn qualifying(
        &self,
        error_signature: &str,
        min_rate: f64,
        min_uses: u32,
    ) -> Vec<LearnedPattern> {
        let mut patterns: Vec<LearnedPattern> = self
            .patterns_for(error_signature)
            .into_iter()
            .filter(|p| p.qualifies(min_rate, min_uses))
            .collect();
        patterns.sort_by(|a, b| {
            b.success_rate
                .total_cmp(&a.success_rate)
                .then(b.uses.cmp(&a.uses))
        });
        patterns
    }

    /// Write pending updates now.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn flush(&self) -> RecoveryResult<()> {
        let mut inner = self.lock();
        self.flush_locked(&mut inner)
    }

    fn flush_locked(&self, inner: &mut Inner) -> RecoveryResult<()> {
        if inner.dirty == 0 {
            return Ok(());
        }
        if let Some(persistence) = &self.persistence {
            let file = LearnedFile {
                version: FORMAT_VERSION,
                patterns: inner.patterns.values().flatten().cloned().collect(),
            };
            write_json(&persistence.path, &file)?;
            tracing::debug!(
                path = %persistence.path.display(),
                patterns = file.patterns.len(),
                "Flushed learned patterns"
            );
        }
        inner.dirty = 0;
        Ok(())
    }

    /// Number of stored patterns across all signatures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().patterns.values().map(Vec::len).sum()
    }

    /// Whether nothing has been learned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Updates not yet written.
    #[must_use]
    pub fn pending_updates(&self) -> u32 {
        self.lock().dirty
    }

    /// Where the store persists, if anywhere.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.persistence.as_ref().map(|p| p.path.as_path())
    }
}

impl Drop for LearnedStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "Failed to persist learned patterns on drop");
        }
    }
}

impl fmt::Debug for LearnedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearnedStore")
            .field("path", &self.path())
            .field("patterns", &self.len())
            .field("alpha", &self.alpha)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::{FixKind, FixPayload};

    fn install(package: &str) -> FixSuggestion {
        FixSuggestion::new(
            format!("Install {package}"),
            FixKind::RunCommand,
            0.85,
            FixPayload::RunCommand {
                command: format!("pip install {package}"),
            },
        )
    }

    const SIG: &str = "dependency_missing:ModuleNotFoundError: No module named 'requests'";

    #[test]
    fn test_success_rate_converges_upwards() {
        let store = LearnedStore::in_memory(&RecoverySettings::default());
        let fix = install("requests");
        store.record(SIG, &fix, false);
        let mut last = store.patterns_for(SIG)[0].success_rate;
        assert!(last.abs() < f64::EPSILON);
        for _ in 0..20 {
            let pattern = store.record(SIG, &fix, true);
            assert!(pattern.success_rate >= last);
            assert!(pattern.success_rate <= 1.0);
            last = pattern.success_rate;
        }
        assert!(last > 0.99);
        assert_eq!(store.patterns_for(SIG)[0].uses, 21);
    }

    #[test]
    fn test_first_outcome_seeds_rate() {
        let store = LearnedStore::in_memory(&RecoverySettings::default());
        let pattern = store.record(SIG, &install("requests"), true);
        assert!((pattern.success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(pattern.uses, 1);
    }

    #[test]
    fn test_patterns_are_per_fix() {
        let store = LearnedStore::in_memory(&RecoverySettings::default());
        store.record(SIG, &install("requests"), true);
        store.record(SIG, &install("requests2"), false);
        store.record("other", &install("requests"), true);
        assert_eq!(store.patterns_for(SIG).len(), 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_qualifying_needs_rate_and_uses() {
        let store = LearnedStore::in_memory(&RecoverySettings::default());
        let fix = install("requests");
        store.record(SIG, &fix, true);
        store.record(SIG, &fix, true);
        assert!(store.qualifying(SIG, 0.9, 3).is_empty());
        store.record(SIG, &fix, true);
        assert_eq!(store.qualifying(SIG, 0.9, 3).len(), 1);
        store.record(SIG, &fix, false);
        assert!(store.qualifying(SIG, 0.9, 3).is_empty());
    }

    #[test]
    fn test_persists_on_flush_interval_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.json");
        let settings = RecoverySettings::default().with_flush_every(2);
        {
            let store = LearnedStore::open(&path, &settings).unwrap();
            store.record(SIG, &install("requests"), true);
            assert!(!path.exists());
            assert_eq!(store.pending_updates(), 1);
            store.record(SIG, &install("requests"), true);
            assert!(path.exists());
            assert_eq!(store.pending_updates(), 0);
            store.record(SIG, &install("requests"), true);
        }
        let store = LearnedStore::open(&path, &settings).unwrap();
        let patterns = store.patterns_for(SIG);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].uses, 3);
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.json");
        let settings = RecoverySettings::default();
        let _first = LearnedStore::open(&path, &settings).unwrap();
        assert!(LearnedStore::open(&path, &settings).is_err());
    }

    #[test]
    fn test_corrupted_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(LearnedStore::open(&path, &RecoverySettings::default()).is_err());
    }
}
