//! Prelude module - commonly used types for convenient import.
//!
//! Use `use rampart_recovery::prelude::*;` to import the engine, the
//! assistant and their reports.

pub use crate::{RecoveryError, RecoveryResult};

pub use crate::{ErrorAnalyzer, LearnedStore, RecoveryEngine, RecoverySettings};

pub use crate::{FixOutcome, FixResult, RecoveryReport, RecoveryState};

pub use crate::{InteractiveRecoveryAssistant, RecoveryDecider};
