//! Rampart Recovery - error analysis and learned repairs.
//!
//! The recovery loop for a failed command or raw error text:
//!
//! 1. [`ErrorAnalyzer`] classifies the text into an
//!    [`ErrorContext`](rampart_core::ErrorContext) with kind, location,
//!    language and a source snippet.
//! 2. [`RecoveryEngine::suggest_fixes`] ranks learned patterns and built-in
//!    rules, HIGH confidence first.
//! 3. [`RecoveryEngine::apply_fix`] runs a fix command through the executor
//!    or edits a file through the ledger, with an undo point.
//! 4. Every outcome updates the [`LearnedStore`].
//!
//! [`InteractiveRecoveryAssistant`] puts a human decision in step 3, and the
//! engine doubles as a [`RetryAdvisor`](rampart_exec::RetryAdvisor) for
//! `execute_with_retry`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod aliases;
pub mod analyzer;
pub mod assistant;
pub mod engine;
/// Recovery error types.
pub mod error;
pub mod learned;
pub mod rules;
pub mod settings;
pub mod state;

pub use analyzer::{ErrorAnalyzer, error_signature};
pub use assistant::{InteractiveRecoveryAssistant, RecoveryDecider};
pub use engine::{FixOutcome, FixResult, RecoveryEngine, RecoveryReport};
pub use error::{RecoveryError, RecoveryResult};
pub use learned::LearnedStore;
pub use rules::rule_suggestions;
pub use settings::{DEMOTE_BELOW_RATE, RecoverySettings};
pub use state::{RecoveryState, RecoveryTracker};
