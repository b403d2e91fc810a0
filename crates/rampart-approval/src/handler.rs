//! The human-in-the-loop seam.

use async_trait::async_trait;

use crate::request::{ApprovalRequest, ApprovalResponse};

/// Trait for frontends that present approval requests to a human.
///
/// The ledger awaits `request_approval` for as long as it takes unless an
/// approval timeout is configured.
///
/// # Example
///
/// ```rust,ignore
/// use rampart_approval::{ApprovalDecision, ApprovalHandler, ApprovalRequest, ApprovalResponse};
///
/// struct TerminalHandler;
///
/// #[async_trait::async_trait]
/// impl ApprovalHandler for TerminalHandler {
///     async fn request_approval(&self, request: ApprovalRequest) -> Option<ApprovalResponse> {
///         // Prompt on the terminal...
///         Some(ApprovalResponse::new(request.id, ApprovalDecision::Approve))
///     }
///
///     fn is_available(&self) -> bool {
///         true
///     }
/// }
/// ```
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Present a request and wait for the answer.
    ///
    /// Returns `None` if no answer was given; the operation is deferred.
    async fn request_approval(&self, request: ApprovalRequest) -> Option<ApprovalResponse>;

    /// Whether a human is currently reachable.
    fn is_available(&self) -> bool;
}
