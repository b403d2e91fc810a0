//! Prelude module - commonly used types for convenient import.
//!
//! Use `use rampart_core::prelude::*;` to import the data model.

pub use crate::{CoreError, CoreResult};

pub use crate::{Decision, Operation, OperationId, OperationKind, PackageRequirement};

pub use crate::{FileBackup, Snapshot, UndoPoint, UndoPointId};

pub use crate::{CommandResult, ExecutionStatus};

pub use crate::{
    ConfidenceTier, ErrorContext, ErrorKind, FailureAnalyzer, FixKind, FixPayload, FixSuggestion,
    Language, LearnedPattern,
};

pub use crate::{ContentHash, RetryConfig, RiskTier, Timestamp};
