//! Approval request and response types.
//!
//! An [`ApprovalRequest`] is what a handler sees: the operation, its risk
//! assessment and why it was escalated. The handler answers with an
//! [`ApprovalResponse`]; the ledger turns that into a [`Decision`] on the
//! operation.

use rampart_core::{Decision, Operation, RiskTier, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::risk::RiskAssessment;

/// Unique identifier for an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req:{}", self.0)
    }
}

/// A request for a human decision on one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique request identifier.
    pub id: RequestId,
    /// The operation awaiting a decision.
    pub operation: Operation,
    /// Why it has the risk tier it has.
    pub assessment: RiskAssessment,
    /// When the request was created.
    pub timestamp: Timestamp,
}

impl ApprovalRequest {
    /// Create a request for `operation`.
    #[must_use]
    pub fn new(operation: Operation, assessment: RiskAssessment) -> Self {
        Self {
            id: RequestId::new(),
            operation,
            assessment,
            timestamp: Timestamp::now(),
        }
    }

    /// Risk tier of the operation.
    #[must_use]
    pub fn risk(&self) -> RiskTier {
        self.assessment.tier
    }

    /// Whether an "always" answer may be remembered for this request.
    #[must_use]
    pub fn allows_preferences(&self) -> bool {
        self.assessment.tier.allows_preferences()
    }
}

impl fmt::Display for ApprovalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} - {}",
            self.assessment.tier, self.operation.description, self.assessment.reason
        )
    }
}

/// A handler's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum ApprovalDecision {
    /// Approve this operation only.
    Approve,
    /// Approve and remember the answer for similar operations.
    ApproveAlways,
    /// Reject this operation only.
    Reject {
        /// Why it was rejected.
        reason: String,
    },
    /// Reject and remember the answer for similar operations.
    RejectAlways {
        /// Why it was rejected.
        reason: String,
    },
}

impl ApprovalDecision {
    /// Reject with a reason.
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject {
            reason: reason.into(),
        }
    }

    /// Whether this is an approval.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approve | Self::ApproveAlways)
    }

    /// Whether the answer should be remembered.
    #[must_use]
    pub fn is_always(&self) -> bool {
        matches!(self, Self::ApproveAlways | Self::RejectAlways { .. })
    }

    /// The operation decision this answer records.
    #[must_use]
    pub fn to_decision(&self) -> Decision {
        if self.is_approved() {
            Decision::Approved
        } else {
            Decision::Rejected
        }
    }

    /// The rejection reason, if this is a rejection.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            Self::Reject { reason } | Self::RejectAlways { reason } => Some(reason),
            Self::Approve | Self::ApproveAlways => None,
        }
    }
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "Approve (once)"),
            Self::ApproveAlways => write!(f, "Approve (always)"),
            Self::Reject { reason } => write!(f, "Reject: {reason}"),
            Self::RejectAlways { reason } => write!(f, "Reject (always): {reason}"),
        }
    }
}

/// Response to an approval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResponse {
    /// The request this response addresses.
    pub request_id: RequestId,
    /// The decision made.
    pub decision: ApprovalDecision,
    /// When the decision was made.
    pub timestamp: Timestamp,
}

impl ApprovalResponse {
    /// Create a new approval response.
    #[must_use]
    pub fn new(request_id: RequestId, decision: ApprovalDecision) -> Self {
        Self {
            request_id,
            decision,
            timestamp: Timestamp::now(),
        }
    }

    /// Check if this response is an approval.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.decision.is_approved()
    }
}

impl fmt::Display for ApprovalResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.request_id, self.decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("req:"));
    }

    #[test]
    fn test_request_display_and_risk() {
        let operation = Operation::command("pip install requests")
            .with_description("Install the HTTP client");
        let request = ApprovalRequest::new(
            operation,
            RiskAssessment::new(RiskTier::Risky, None, "pip modifies state"),
        );
        assert_eq!(request.risk(), RiskTier::Risky);
        assert!(request.allows_preferences());
        let shown = request.to_string();
        assert!(shown.contains("Install the HTTP client"));
        assert!(shown.contains("pip modifies state"));
    }

    #[test]
    fn test_dangerous_request_disallows_preferences() {
        let request = ApprovalRequest::new(
            Operation::command("sudo reboot"),
            RiskAssessment::new(RiskTier::Dangerous, None, "reboots"),
        );
        assert!(!request.allows_preferences());
    }

    #[test]
    fn test_decision_mapping() {
        assert_eq!(ApprovalDecision::Approve.to_decision(), Decision::Approved);
        assert_eq!(
            ApprovalDecision::ApproveAlways.to_decision(),
            Decision::Approved
        );
        let reject = ApprovalDecision::reject("not now");
        assert_eq!(reject.to_decision(), Decision::Rejected);
        assert_eq!(reject.rejection_reason(), Some("not now"));
        assert!(!reject.is_always());
        assert!(
            ApprovalDecision::RejectAlways {
                reason: "never".into()
            }
            .is_always()
        );
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_string(&ApprovalDecision::reject("no")).unwrap();
        assert!(json.contains("\"decision\":\"reject\""));
        let back: ApprovalDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ApprovalDecision::reject("no"));
    }

    #[test]
    fn test_response() {
        let response = ApprovalResponse::new(RequestId::new(), ApprovalDecision::Approve);
        assert!(response.is_approved());
        assert!(response.to_string().contains("Approve (once)"));
    }
}
