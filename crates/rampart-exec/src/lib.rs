//! Rampart Exec - approval-gated command execution.
//!
//! [`CommandExecutor`] runs shell commands as child processes once the
//! approval ledger allows them:
//!
//! - DANGEROUS commands are blocked without spawning unless explicitly
//!   overridden
//! - hard timeouts and external cancellation kill the child
//! - stdout and stderr are streamed line by line to an optional callback
//! - every result lands in a bounded [`CommandHistory`] with
//!   [`ExecutionStats`]
//! - [`CommandExecutor::execute_with_retry`] retries failures with backoff,
//!   consulting a [`RetryAdvisor`] between attempts
//!
//! Expected failures are reported in [`CommandResult::status`](rampart_core::CommandResult),
//! never as errors.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod config;
/// Executor error types.
pub mod error;
pub mod executor;
pub mod history;
pub mod output;
pub mod retry;

pub use config::{
    DEFAULT_HISTORY_SIZE, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT, ExecOptions, ExecutorConfig,
};
pub use error::{ExecError, ExecResult};
pub use executor::CommandExecutor;
pub use history::{CommandHistory, ExecutionStats};
pub use output::{OutputCallback, OutputLine, StreamKind};
pub use retry::{AppliedFix, RetryAdvisor, RetryOutcome};
