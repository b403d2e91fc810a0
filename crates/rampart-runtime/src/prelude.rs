//! Prelude module - commonly used types for convenient import.
//!
//! Use `use rampart_runtime::prelude::*;` to import the engine and its
//! records.

// Errors
pub use crate::{EngineError, EngineResult};

// Engine
pub use crate::{Engine, ExecutorRollback};

// Batch results
pub use crate::{BatchReport, OperationOutcome, OperationReport};
