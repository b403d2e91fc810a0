//! Rampart Core - Data model for the safety-gated execution & recovery engine.
//!
//! This crate provides the records that flow between the engine components:
//! - [`Operation`] and [`Decision`]: proposed work and its approval state
//! - [`UndoPoint`] and [`Snapshot`]: rollback checkpoints
//! - [`CommandResult`]: immutable outcome of a command execution
//! - [`ErrorContext`], [`FixSuggestion`], [`LearnedPattern`]: recovery records
//! - [`ContentHash`]: BLAKE3 checksums used for conflict detection and backups
//! - [`RetryConfig`]: exponential backoff parameters
//!
//! It has no knowledge of how decisions are made or commands are run; the
//! component crates build on these types.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod command;
pub mod diagnosis;
pub mod error;
pub mod hash;
pub mod operation;
pub mod retry;
pub mod types;
pub mod undo;

pub use command::{CommandResult, ExecutionStatus};
pub use diagnosis::{
    CodeEdit, ConfidenceTier, ErrorContext, ErrorKind, FailureAnalyzer, FixKind, FixPayload,
    FixSuggestion, Language, LearnedPattern, SuggestionSource,
};
pub use error::{CoreError, CoreResult};
pub use hash::ContentHash;
pub use operation::{Decision, Operation, OperationId, OperationKind, PackageRequirement};
pub use retry::RetryConfig;
pub use types::{RiskTier, Timestamp};
pub use undo::{FileBackup, Snapshot, UndoPoint, UndoPointId};
