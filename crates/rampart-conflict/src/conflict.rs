//! Conflict records and resolutions.

use rampart_core::OperationId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(pub Uuid);

impl ConflictId {
    /// Create a new random conflict ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conflict:{}", self.0)
    }
}

/// What kind of incompatibility was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The file changed on disk after the operation read it.
    FileModifiedSinceRead,
    /// The operation expects a file that no longer exists.
    FileDeleted,
    /// Several operations in one batch write the same file.
    ConcurrentEdit,
    /// Operations ask for incompatible versions of one package.
    DependencyVersionClash,
    /// New content contains unresolved merge markers.
    MergeConflict,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FileModifiedSinceRead => "file_modified_since_read",
            Self::FileDeleted => "file_deleted",
            Self::ConcurrentEdit => "concurrent_edit",
            Self::DependencyVersionClash => "dependency_version_clash",
            Self::MergeConflict => "merge_conflict",
        };
        f.write_str(s)
    }
}

/// A caller-driven way of resolving a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Resolution {
    /// Drop the listed operations from the batch.
    Discard {
        /// Operations to remove.
        operations: Vec<OperationId>,
    },
    /// Re-read the targets of the listed operations and plan against the
    /// current disk state.
    Reload {
        /// Operations to re-plan.
        operations: Vec<OperationId>,
    },
    /// Keep every operation and sequence them: later writes are rebased
    /// onto earlier ones, clashing requirements unify to the earliest.
    ///
    /// Content is never combined. Of two rebased writes, the later one's
    /// content replaces the earlier one's.
    Merge,
}

impl Resolution {
    /// Short name for messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Discard { .. } => "discard",
            Self::Reload { .. } => "reload",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A ranked resolution option. Rank 1 is the recommended one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSuggestion {
    /// Position in the ranking, starting at 1.
    pub rank: u8,
    /// The resolution to apply.
    pub resolution: Resolution,
    /// What applying it does, naming operations and resources.
    pub description: String,
}

/// An incompatibility between operations and/or the disk state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// Unique identifier.
    pub id: ConflictId,
    /// Kind of conflict.
    pub kind: ConflictKind,
    /// Every operation involved, in submission order.
    pub operations: Vec<OperationId>,
    /// Affected resources: normalized file paths or package names.
    pub resources: Vec<String>,
    /// Operations that should not proceed as planned. For concurrent edits
    /// these are the later-submitted writers.
    pub flagged: Vec<OperationId>,
    /// Why the conflict was raised.
    pub reason: String,
    /// Resolution options, best first.
    pub suggestions: Vec<ResolutionSuggestion>,
    /// Whether a resolution has been applied.
    pub resolved: bool,
}

impl Conflict {
    pub(crate) fn new(
        kind: ConflictKind,
        operations: Vec<OperationId>,
        resource: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            kind,
            flagged: operations.clone(),
            operations,
            resources: vec![resource.into()],
            reason: reason.into(),
            suggestions: Vec::new(),
            resolved: false,
        }
    }

    #[must_use]
    pub(crate) fn with_flagged(mut self, flagged: Vec<OperationId>) -> Self {
        self.flagged = flagged;
        self
    }

    #[must_use]
    pub(crate) fn suggest(mut self, resolution: Resolution, description: impl Into<String>) -> Self {
        let rank = u8::try_from(self.suggestions.len())
            .unwrap_or(u8::MAX)
            .saturating_add(1);
        self.suggestions.push(ResolutionSuggestion {
            rank,
            resolution,
            description: description.into(),
        });
        self
    }

    /// Whether `id` takes part in this conflict.
    #[must_use]
    pub fn involves(&self, id: OperationId) -> bool {
        self.operations.contains(&id)
    }

    /// The recommended resolution, if any.
    #[must_use]
    pub fn recommended(&self) -> Option<&Resolution> {
        self.suggestions.first().map(|s| &s.resolution)
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}: {}", self.kind, self.resources.join(", "), self.reason)?;
        for suggestion in &self.suggestions {
            write!(f, "\n  {}. {}", suggestion.rank, suggestion.description)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestions_are_ranked_in_order() {
        let a = OperationId::new();
        let conflict = Conflict::new(ConflictKind::FileDeleted, vec![a], "src/lib.rs", "gone")
            .suggest(
                Resolution::Reload { operations: vec![a] },
                "reload src/lib.rs",
            )
            .suggest(
                Resolution::Discard { operations: vec![a] },
                "discard the edit",
            );
        assert_eq!(conflict.suggestions[0].rank, 1);
        assert_eq!(conflict.suggestions[1].rank, 2);
        assert_eq!(conflict.recommended().map(Resolution::name), Some("reload"));
        assert!(conflict.involves(a));
        assert!(!conflict.resolved);
    }

    #[test]
    fn test_display_lists_options() {
        let a = OperationId::new();
        let conflict = Conflict::new(ConflictKind::MergeConflict, vec![a], "a.txt", "markers")
            .suggest(Resolution::Discard { operations: vec![a] }, "drop it");
        let text = conflict.to_string();
        assert!(text.starts_with("merge_conflict on a.txt: markers"));
        assert!(text.contains("1. drop it"));
    }

    #[test]
    fn test_resolution_serde_tagged() {
        let json = serde_json::to_string(&Resolution::Merge).unwrap();
        assert_eq!(json, r#"{"type":"merge"}"#);
    }
}
