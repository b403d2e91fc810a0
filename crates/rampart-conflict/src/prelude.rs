//! Prelude module - commonly used types for convenient import.
//!
//! Use `use rampart_conflict::prelude::*;` to import the detector and its records.

pub use crate::{ConflictError, ConflictResult};

pub use crate::{Conflict, ConflictId, ConflictKind, Resolution, ResolutionSuggestion};

pub use crate::{ConflictDetector, DiskState, FsDiskState, MemoryDiskState, resolve_conflict};
