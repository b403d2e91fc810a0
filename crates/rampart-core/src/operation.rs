//! Operations: units of proposed work submitted to the ledger.
//!
//! An [`Operation`] is created by an upstream planner, handed to the
//! approval ledger and from then on only its [`Decision`] changes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::hash::ContentHash;
use crate::types::{RiskTier, Timestamp};

/// Unique identifier for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    /// Create a new random operation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op:{}", self.0)
    }
}

/// What an operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create a new file.
    FileCreate,
    /// Rewrite an existing file.
    FileModify,
    /// Delete a file.
    FileDelete,
    /// Run a shell command.
    CommandExecute,
    /// A composite record standing for several operations.
    Batch,
}

impl OperationKind {
    /// Whether the operation writes to or removes a file.
    #[must_use]
    pub fn mutates_file(self) -> bool {
        matches!(self, Self::FileCreate | Self::FileModify | Self::FileDelete)
    }

    /// Whether the operation expects its target file to already exist.
    #[must_use]
    pub fn expects_existing(self) -> bool {
        matches!(self, Self::FileModify | Self::FileDelete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FileCreate => "file_create",
            Self::FileModify => "file_modify",
            Self::FileDelete => "file_delete",
            Self::CommandExecute => "command_execute",
            Self::Batch => "batch",
        };
        f.write_str(s)
    }
}

/// Approval state of an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Not decided yet.
    #[default]
    Pending,
    /// Approved by a human or a stored preference.
    Approved,
    /// Rejected by a human or a stored preference.
    Rejected,
    /// No decision could be obtained; the operation does not run.
    Deferred,
    /// Approved without asking because the operation is safe.
    AutoApproved,
}

impl Decision {
    /// Check if this decision lets the operation run.
    #[must_use]
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved | Self::AutoApproved)
    }

    /// Check if this decision is final.
    #[must_use]
    pub fn is_final(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::AutoApproved)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Deferred => "deferred",
            Self::AutoApproved => "auto_approved",
        };
        f.write_str(s)
    }
}

/// A package an operation asks for, with the version requirement it needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRequirement {
    /// Package name as the ecosystem spells it.
    pub name: String,
    /// Version requirement as written (`"^1.2"`, `"==2.28.1"`, `"*"`).
    pub requirement: String,
}

impl PackageRequirement {
    /// Create a new package requirement.
    #[must_use]
    pub fn new(name: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirement: requirement.into(),
        }
    }

    /// Whether the requirement accepts any version.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        let req = self.requirement.trim();
        req.is_empty() || req == "*" || req.eq_ignore_ascii_case("latest")
    }
}

impl fmt::Display for PackageRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.requirement)
        }
    }
}

/// A unit of proposed work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Unique operation identifier.
    pub id: OperationId,
    /// What the operation does.
    pub kind: OperationKind,
    /// Human-readable description.
    pub description: String,
    /// Target path (file operations) or command string.
    pub target: String,
    /// Risk tier. Recomputed by the ledger on submission.
    pub risk: RiskTier,
    /// Arbitrary caller metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// When the operation was created.
    pub created_at: Timestamp,
    /// New file content for create/modify operations.
    #[serde(default)]
    pub content: Option<String>,
    /// Checksum of the target as it was read when the operation was planned.
    #[serde(default)]
    pub read_checksum: Option<ContentHash>,
    /// Packages this operation installs or pins.
    #[serde(default)]
    pub packages: Vec<PackageRequirement>,
    decision: Decision,
}

impl Operation {
    fn base(kind: OperationKind, target: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            description: description.into(),
            target: target.into(),
            risk: RiskTier::default(),
            metadata: BTreeMap::new(),
            created_at: Timestamp::now(),
            content: None,
            read_checksum: None,
            packages: Vec::new(),
            decision: Decision::Pending,
        }
    }

    /// Create a file that does not exist yet.
    #[must_use]
    pub fn file_create(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let description = format!("create {path}");
        Self::base(OperationKind::FileCreate, path, description).with_content(content)
    }

    /// Rewrite an existing file.
    #[must_use]
    pub fn file_modify(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let description = format!("modify {path}");
        Self::base(OperationKind::FileModify, path, description).with_content(content)
    }

    /// Delete a file.
    #[must_use]
    pub fn file_delete(path: impl Into<String>) -> Self {
        let path = path.into();
        let description = format!("delete {path}");
        Self::base(OperationKind::FileDelete, path, description)
    }

    /// Run a shell command.
    #[must_use]
    pub fn command(command: impl Into<String>) -> Self {
        let command = command.into();
        let description = format!("run `{command}`");
        Self::base(OperationKind::CommandExecute, command, description)
    }

    /// A composite record covering several operations.
    ///
    /// The risk is the maximum risk of the members and the member ids are
    /// recorded in the `members` metadata entry.
    #[must_use]
    pub fn batch(description: impl Into<String>, members: &[Operation]) -> Self {
        let target = format!("{} operations", members.len());
        let mut op = Self::base(OperationKind::Batch, target, description);
        op.risk = members
            .iter()
            .map(|m| m.risk)
            .max()
            .unwrap_or(RiskTier::Safe);
        let ids: Vec<String> = members.iter().map(|m| m.id.to_string()).collect();
        op.metadata.insert("members".to_string(), ids.join(","));
        op
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the new content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Record the checksum the target had when this operation was planned.
    #[must_use]
    pub fn with_read_checksum(mut self, checksum: ContentHash) -> Self {
        self.read_checksum = Some(checksum);
        self
    }

    /// Record the checksum of `content` as the planned-against state.
    #[must_use]
    pub fn read_from(self, content: &[u8]) -> Self {
        self.with_read_checksum(ContentHash::hash(content))
    }

    /// Add a package requirement.
    #[must_use]
    pub fn with_package(mut self, package: PackageRequirement) -> Self {
        self.packages.push(package);
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Override the risk tier.
    #[must_use]
    pub fn with_risk(mut self, risk: RiskTier) -> Self {
        self.risk = risk;
        self
    }

    /// Current decision.
    #[must_use]
    pub fn decision(&self) -> Decision {
        self.decision
    }

    /// Record a decision.
    ///
    /// Final decisions (`Approved`, `Rejected`, `AutoApproved`) are never
    /// overwritten by a different decision.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDecision`] when the operation already holds
    /// a different final decision.
    pub fn record_decision(&mut self, decision: Decision) -> CoreResult<()> {
        if self.decision.is_final() && self.decision != decision {
            return Err(CoreError::InvalidDecision {
                from: self.decision.to_string(),
                to: decision.to_string(),
            });
        }
        self.decision = decision;
        Ok(())
    }

    /// Target interpreted as a filesystem path.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        Path::new(&self.target)
    }

    /// Validate field consistency for the operation kind.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] when the target is empty or a
    /// create/modify operation carries no content.
    pub fn validate(&self) -> CoreResult<()> {
        if self.target.trim().is_empty() {
            return Err(CoreError::InvalidOperation(format!(
                "{} has an empty target",
                self.id
            )));
        }
        if matches!(
            self.kind,
            OperationKind::FileCreate | OperationKind::FileModify
        ) && self.content.is_none()
        {
            return Err(CoreError::InvalidOperation(format!(
                "{} ({}) has no content to write",
                self.id, self.kind
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.risk, self.kind, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_kind_and_target() {
        let op = Operation::file_modify("config.yaml", "a: 1\n");
        assert_eq!(op.kind, OperationKind::FileModify);
        assert_eq!(op.target, "config.yaml");
        assert_eq!(op.content.as_deref(), Some("a: 1\n"));
        assert_eq!(op.decision(), Decision::Pending);
        assert_eq!(op.risk, RiskTier::Risky);

        let op = Operation::command("ls -la");
        assert_eq!(op.kind, OperationKind::CommandExecute);
        assert!(op.description.contains("ls -la"));
    }

    #[test]
    fn test_final_decision_is_sticky() {
        let mut op = Operation::command("cargo build");
        op.record_decision(Decision::Deferred).unwrap();
        op.record_decision(Decision::Approved).unwrap();
        op.record_decision(Decision::Approved).unwrap();
        assert!(op.record_decision(Decision::Rejected).is_err());
        assert_eq!(op.decision(), Decision::Approved);
    }

    #[test]
    fn test_validate() {
        assert!(Operation::file_delete("a.txt").validate().is_ok());
        assert!(Operation::command("  ").validate().is_err());

        let mut op = Operation::file_create("b.txt", "x");
        op.content = None;
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_batch_takes_max_risk() {
        let a = Operation::command("ls").with_risk(RiskTier::Safe);
        let b = Operation::command("rm -rf /").with_risk(RiskTier::Dangerous);
        let batch = Operation::batch("cleanup", &[a.clone(), b.clone()]);
        assert_eq!(batch.kind, OperationKind::Batch);
        assert_eq!(batch.risk, RiskTier::Dangerous);
        let members = batch.metadata.get("members").unwrap();
        assert!(members.contains(&a.id.to_string()));
        assert!(members.contains(&b.id.to_string()));
    }

    #[test]
    fn test_package_requirement_wildcard() {
        assert!(PackageRequirement::new("requests", "").is_wildcard());
        assert!(PackageRequirement::new("requests", "*").is_wildcard());
        assert!(!PackageRequirement::new("requests", "==2.0").is_wildcard());
        assert_eq!(
            PackageRequirement::new("left-pad", "^1.3").to_string(),
            "left-pad@^1.3"
        );
    }

    #[test]
    fn test_serde_keeps_decision() {
        let mut op = Operation::file_create("x.md", "# x").read_from(b"");
        op.record_decision(Decision::AutoApproved).unwrap();
        let json = serde_json::to_string(&op).unwrap();
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, op.id);
        assert_eq!(back.decision(), Decision::AutoApproved);
        assert_eq!(back.read_checksum, op.read_checksum);
    }
}
