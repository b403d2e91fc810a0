//! Rampart Approval - risk classification, approval decisions and undo.
//!
//! This crate decides whether proposed operations may run and keeps what is
//! needed to reverse them:
//!
//! - [`RiskClassifier`]: deterministic SAFE / RISKY / DANGEROUS tiers
//! - [`ApprovalLedger`]: the decision flow (conflicts, auto-approval,
//!   preferences, human handler), snapshots and rollback
//! - [`PreferenceStore`]: remembered approve/reject rules
//! - [`UndoStore`]: the bounded, persisted undo history
//!
//! # Example
//!
//! ```
//! use rampart_approval::RiskClassifier;
//! use rampart_core::RiskTier;
//!
//! let classifier = RiskClassifier::new();
//! assert_eq!(classifier.classify("git status"), RiskTier::Safe);
//! assert_eq!(classifier.classify("pip install requests"), RiskTier::Risky);
//! assert_eq!(classifier.classify("rm -rf /"), RiskTier::Dangerous);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

/// Ledger error types.
pub mod error;
pub mod handler;
pub mod ledger;
pub mod preferences;
pub mod request;
pub mod risk;
pub mod rollback;
pub mod undo;

pub use error::{LedgerError, LedgerResult};
pub use handler::ApprovalHandler;
pub use ledger::{
    ApprovalLedger, ApprovalOutcome, DEFAULT_MAX_UNDO_POINTS, DecisionSource,
    INVERSE_METADATA_KEY, LedgerOptions,
};
pub use preferences::{Preference, PreferencePattern, PreferenceStore};
pub use request::{ApprovalDecision, ApprovalRequest, ApprovalResponse, RequestId};
pub use risk::{RiskAssessment, RiskClassifier};
pub use rollback::{FilesOnlyRollback, RollbackHook};
pub use undo::UndoStore;
