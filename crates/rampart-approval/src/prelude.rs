//! Prelude module - commonly used types for convenient import.
//!
//! Use `use rampart_approval::prelude::*;` to import the ledger and its seams.

pub use crate::{LedgerError, LedgerResult};

pub use crate::{ApprovalLedger, ApprovalOutcome, DecisionSource, LedgerOptions};

pub use crate::{ApprovalDecision, ApprovalHandler, ApprovalRequest, ApprovalResponse};

pub use crate::{PreferencePattern, RiskAssessment, RiskClassifier, RollbackHook};
