//! Remembered approval decisions.
//!
//! A preference pairs a pattern with an approve/reject decision. The ledger
//! consults preferences before prompting, and never for DANGEROUS operations.

use globset::Glob;
use rampart_core::{Decision, Operation, OperationKind, Timestamp};
use rampart_storage::{read_json, write_json};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use crate::error::{LedgerError, LedgerResult};

/// Characters that make a command compound or redirected. Such commands
/// never match a prefix preference.
const SHELL_META: &[char] = &[';', '|', '&', '>', '<', '`', '$', '\n'];

/// What a preference applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PreferencePattern {
    /// File operations whose path or file name matches a glob.
    FileGlob {
        /// Glob pattern, e.g. `*.md` or `docs/**`.
        pattern: String,
    },
    /// Commands starting with the given words, e.g. `pip install`.
    CommandPrefix {
        /// Leading words of the command.
        prefix: String,
    },
}

impl PreferencePattern {
    /// A file glob pattern.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidPattern`] if the glob does not compile
    /// or contains a `..` component.
    pub fn file_glob(pattern: impl Into<String>) -> LedgerResult<Self> {
        let pattern = pattern.into();
        if has_parent_dir(&pattern) {
            return Err(LedgerError::InvalidPattern {
                pattern,
                reason: "path traversal is not allowed".to_string(),
            });
        }
        Glob::new(&pattern).map_err(|e| LedgerError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self::FileGlob { pattern })
    }

    /// A command prefix pattern. Whitespace is normalized.
    #[must_use]
    pub fn command_prefix(prefix: &str) -> Self {
        Self::CommandPrefix {
            prefix: prefix.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }

    /// Derive the pattern an "always" answer should be remembered under.
    ///
    /// Files map to `*.ext`, or their file name when they have no
    /// extension. Commands map to their verb, plus the subcommand when the
    /// second word looks like one (`pip install`, `git commit`).
    #[must_use]
    pub fn derive(operation: &Operation) -> Option<Self> {
        match operation.kind {
            OperationKind::FileCreate | OperationKind::FileModify | OperationKind::FileDelete => {
                let path = operation.target_path();
                let pattern = match path.extension().and_then(|e| e.to_str()) {
                    Some(ext) => format!("*.{ext}"),
                    None => path.file_name()?.to_str()?.to_string(),
                };
                Self::file_glob(pattern).ok()
            },
            OperationKind::CommandExecute => {
                let mut words = operation.target.split_whitespace();
                let verb = words.next()?;
                if verb.contains('=') || verb.contains(SHELL_META) {
                    return None;
                }
                let prefix = match words.next() {
                    Some(sub)
                        if sub.chars().all(|c| c.is_ascii_lowercase() || c == '-')
                            && !sub.starts_with('-') =>
                    {
                        format!("{verb} {sub}")
                    },
                    _ => verb.to_string(),
                };
                Some(Self::CommandPrefix { prefix })
            },
            OperationKind::Batch => None,
        }
    }

    /// Check whether the pattern covers an operation.
    #[must_use]
    pub fn matches(&self, operation: &Operation) -> bool {
        match (self, operation.kind) {
            (
                Self::FileGlob { pattern },
                OperationKind::FileCreate | OperationKind::FileModify | OperationKind::FileDelete,
            ) => matches_file_glob(pattern, operation.target_path()),
            (Self::CommandPrefix { prefix }, OperationKind::CommandExecute) => {
                matches_command_prefix(prefix, &operation.target)
            },
            _ => false,
        }
    }
}

impl fmt::Display for PreferencePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileGlob { pattern } => write!(f, "file:{pattern}"),
            Self::CommandPrefix { prefix } => write!(f, "command:{prefix}"),
        }
    }
}

fn has_parent_dir(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

fn matches_file_glob(pattern: &str, path: &Path) -> bool {
    let Some(path_str) = path.to_str() else {
        return false;
    };
    if has_parent_dir(path_str) {
        return false;
    }
    let normalized: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    Glob::new(pattern).ok().is_some_and(|glob| {
        let matcher = glob.compile_matcher();
        matcher.is_match(&normalized)
            || path
                .file_name()
                .is_some_and(|name| matcher.is_match(Path::new(name)))
    })
}

fn matches_command_prefix(prefix: &str, command: &str) -> bool {
    if prefix.is_empty() || command.contains(SHELL_META) {
        return false;
    }
    let mut words = command.split_whitespace();
    prefix
        .split_whitespace()
        .all(|expected| words.next() == Some(expected))
}

/// A remembered decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    /// What it applies to.
    pub pattern: PreferencePattern,
    /// `Approved` or `Rejected`.
    pub decision: Decision,
    /// When it was recorded.
    pub created_at: Timestamp,
}

/// Store of remembered decisions, optionally persisted to a JSON file.
///
/// Thread-safe via an internal [`RwLock`].
pub struct PreferenceStore {
    path: Option<PathBuf>,
    preferences: RwLock<Vec<Preference>>,
}

impl PreferenceStore {
    /// A store that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            preferences: RwLock::new(Vec::new()),
        }
    }

    /// Open a store persisted at `path`, loading existing preferences.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file exists but cannot be parsed.
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let path = path.into();
        let preferences: Vec<Preference> = read_json(&path)?.unwrap_or_default();
        tracing::debug!(path = %path.display(), count = preferences.len(), "Loaded preferences");
        Ok(Self {
            path: Some(path),
            preferences: RwLock::new(preferences),
        })
    }

    /// Remember `decision` for `pattern`, replacing any earlier entry for
    /// the same pattern.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidPreference`] for decisions other than
    /// approve/reject, or a storage error if persisting fails.
    pub fn remember(&self, pattern: PreferencePattern, decision: Decision) -> LedgerResult<()> {
        let decision = match decision {
            Decision::Approved | Decision::AutoApproved => Decision::Approved,
            Decision::Rejected => Decision::Rejected,
            other @ (Decision::Pending | Decision::Deferred) => {
                return Err(LedgerError::InvalidPreference(other.to_string()));
            },
        };
        let mut preferences = self.preferences.write().unwrap_or_else(|e| {
            tracing::warn!("PreferenceStore write lock poisoned, recovering");
            e.into_inner()
        });
        preferences.retain(|p| p.pattern != pattern);
        tracing::info!(pattern = %pattern, %decision, "Remembering preference");
        preferences.push(Preference {
            pattern,
            decision,
            created_at: Timestamp::now(),
        });
        self.persist(&preferences)
    }

    /// Remove the preference for `pattern`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if persisting fails.
    pub fn forget(&self, pattern: &PreferencePattern) -> LedgerResult<bool> {
        let mut preferences = self.preferences.write().unwrap_or_else(|e| {
            tracing::warn!("PreferenceStore write lock poisoned, recovering");
            e.into_inner()
        });
        let before = preferences.len();
        preferences.retain(|p| &p.pattern != pattern);
        if preferences.len() == before {
            return Ok(false);
        }
        self.persist(&preferences)?;
        Ok(true)
    }

    /// The preference covering `operation`, if any. When both an approval
    /// and a rejection match, the rejection wins.
    #[must_use]
    pub fn lookup(&self, operation: &Operation) -> Option<Preference> {
        let preferences = self.preferences.read().unwrap_or_else(|e| {
            tracing::warn!("PreferenceStore read lock poisoned, recovering");
            e.into_inner()
        });
        let mut matching = preferences.iter().filter(|p| p.pattern.matches(operation));
        let first = matching.next()?;
        if first.decision == Decision::Rejected {
            return Some(first.clone());
        }
        Some(
            matching
                .find(|p| p.decision == Decision::Rejected)
                .unwrap_or(first)
                .clone(),
        )
    }

    /// All stored preferences, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<Preference> {
        self.preferences
            .read()
            .unwrap_or_else(|e| {
                tracing::warn!("PreferenceStore read lock poisoned, recovering");
                e.into_inner()
            })
            .clone()
    }

    /// Number of stored preferences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list().len()
    }

    /// Whether no preferences are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, preferences: &[Preference]) -> LedgerResult<()> {
        if let Some(path) = &self.path {
            write_json(path, preferences)?;
        }
        Ok(())
    }
}

impl fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("path", &self.path)
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_file_pattern() {
        let op = Operation::file_modify("docs/guide.md", "# Guide");
        assert_eq!(
            PreferencePattern::derive(&op),
            Some(PreferencePattern::FileGlob {
                pattern: "*.md".into()
            })
        );
        let op = Operation::file_create("Makefile", "all:");
        assert_eq!(
            PreferencePattern::derive(&op),
            Some(PreferencePattern::FileGlob {
                pattern: "Makefile".into()
            })
        );
    }

    #[test]
    fn test_derive_command_pattern() {
        let op = Operation::command("pip install requests");
        assert_eq!(
            PreferencePattern::derive(&op),
            Some(PreferencePattern::command_prefix("pip install"))
        );
        let op = Operation::command("make -j8");
        assert_eq!(
            PreferencePattern::derive(&op),
            Some(PreferencePattern::command_prefix("make"))
        );
        assert!(PreferencePattern::derive(&Operation::command("FOO=1 make")).is_none());
    }

    #[test]
    fn test_file_glob_matches_path_or_name() {
        let pattern = PreferencePattern::file_glob("*.md").unwrap();
        assert!(pattern.matches(&Operation::file_modify("README.md", "x")));
        assert!(pattern.matches(&Operation::file_delete("./docs/deep/notes.md")));
        assert!(!pattern.matches(&Operation::file_modify("src/lib.rs", "x")));
        assert!(!pattern.matches(&Operation::command("cat README.md")));

        let scoped = PreferencePattern::file_glob("docs/**").unwrap();
        assert!(scoped.matches(&Operation::file_create("docs/a/b.txt", "x")));
        assert!(!scoped.matches(&Operation::file_create("src/docs.txt", "x")));
    }

    #[test]
    fn test_file_glob_rejects_traversal() {
        assert!(PreferencePattern::file_glob("../*.md").is_err());
        let pattern = PreferencePattern::file_glob("*.md").unwrap();
        assert!(!pattern.matches(&Operation::file_modify("../outside/x.md", "x")));
    }

    #[test]
    fn test_invalid_glob() {
        assert!(matches!(
            PreferencePattern::file_glob("a[").unwrap_err(),
            LedgerError::InvalidPattern { .. }
        ));
    }

    #[test]
    fn test_command_prefix_is_word_based() {
        let pattern = PreferencePattern::command_prefix("git  commit");
        assert!(pattern.matches(&Operation::command("git commit -m wip")));
        assert!(!pattern.matches(&Operation::command("git commitx")));
        assert!(!pattern.matches(&Operation::command("git push")));
        assert!(!pattern.matches(&Operation::command("git commit -m x && git push")));
        assert!(!pattern.matches(&Operation::file_modify("git", "x")));
    }

    #[test]
    fn test_remember_replaces_and_lookup() {
        let store = PreferenceStore::in_memory();
        let pattern = PreferencePattern::command_prefix("npm install");
        store
            .remember(pattern.clone(), Decision::Approved)
            .unwrap();
        store
            .remember(pattern.clone(), Decision::Rejected)
            .unwrap();
        assert_eq!(store.len(), 1);
        let found = store.lookup(&Operation::command("npm install left-pad")).unwrap();
        assert_eq!(found.decision, Decision::Rejected);
        assert!(store.lookup(&Operation::command("npm test")).is_none());
    }

    #[test]
    fn test_rejection_wins() {
        let store = PreferenceStore::in_memory();
        store
            .remember(PreferencePattern::file_glob("*.rs").unwrap(), Decision::Approved)
            .unwrap();
        store
            .remember(
                PreferencePattern::file_glob("src/main.rs").unwrap(),
                Decision::Rejected,
            )
            .unwrap();
        let found = store
            .lookup(&Operation::file_modify("src/main.rs", "fn main() {}"))
            .unwrap();
        assert_eq!(found.decision, Decision::Rejected);
        let found = store
            .lookup(&Operation::file_modify("src/lib.rs", ""))
            .unwrap();
        assert_eq!(found.decision, Decision::Approved);
    }

    #[test]
    fn test_remember_rejects_non_final_decisions() {
        let store = PreferenceStore::in_memory();
        let err = store
            .remember(PreferencePattern::command_prefix("ls"), Decision::Deferred)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPreference(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        {
            let store = PreferenceStore::open(&path).unwrap();
            store
                .remember(PreferencePattern::command_prefix("cargo build"), Decision::Approved)
                .unwrap();
            store
                .remember(PreferencePattern::file_glob("*.lock").unwrap(), Decision::Rejected)
                .unwrap();
            assert!(store
                .forget(&PreferencePattern::file_glob("*.lock").unwrap())
                .unwrap());
        }
        let reopened = PreferenceStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(
            reopened.list()[0].pattern,
            PreferencePattern::command_prefix("cargo build")
        );
    }
}
