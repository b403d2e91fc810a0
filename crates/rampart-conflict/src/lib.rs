//! Rampart Conflict - pre-flight validation of operation batches.
//!
//! [`ConflictDetector::detect`] compares a batch of proposed operations with
//! the current on-disk state and with each other, and reports every
//! incompatibility as a [`Conflict`]:
//!
//! - a file changed on disk after the operation read it
//! - a file an operation expects to modify is gone
//! - two operations in the batch write the same file without sequencing
//! - two operations ask for incompatible versions of one package
//! - new content still carries merge markers
//!
//! Detection never touches the batch. [`resolve_conflict`] applies a
//! caller-chosen [`Resolution`] and marks the conflict resolved.
//!
//! # Example
//!
//! ```
//! use rampart_conflict::{ConflictDetector, ConflictKind, MemoryDiskState};
//! use rampart_core::Operation;
//!
//! let disk = MemoryDiskState::new().with_file("config.yaml", b"a: 1\n");
//! let batch = vec![
//!     Operation::file_modify("config.yaml", "a: 2\n").read_from(b"a: 1\n"),
//!     Operation::file_modify("config.yaml", "a: 3\n").read_from(b"a: 1\n"),
//! ];
//!
//! let conflicts = ConflictDetector::new().detect(&batch, &disk).unwrap();
//! assert_eq!(conflicts.len(), 1);
//! assert_eq!(conflicts[0].kind, ConflictKind::ConcurrentEdit);
//! assert_eq!(conflicts[0].flagged, vec![batch[1].id]);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod conflict;
pub mod detector;
pub mod disk;
pub mod error;
pub mod packages;
pub mod resolve;

pub use conflict::{Conflict, ConflictId, ConflictKind, Resolution, ResolutionSuggestion};
pub use detector::{ConflictDetector, has_merge_markers};
pub use disk::{DiskState, FsDiskState, MemoryDiskState, normalize_resource};
pub use error::{ConflictError, ConflictResult};
pub use packages::{
    PackageManager, ParsedRequirement, normalize_name, parse_install_command,
    requirements_compatible,
};
pub use resolve::resolve_conflict;
