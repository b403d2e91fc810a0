//! Prelude module - commonly used types for convenient import.
//!
//! Use `use rampart_exec::prelude::*;` to import the executor and its options.

pub use crate::{ExecError, ExecResult};

pub use crate::{CommandExecutor, ExecOptions, ExecutorConfig};

pub use crate::{AppliedFix, RetryAdvisor, RetryOutcome};

pub use crate::{ExecutionStats, OutputLine, StreamKind};
