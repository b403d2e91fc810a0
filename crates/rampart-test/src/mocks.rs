//! Scripted implementations of the engine's human-in-the-loop seams.

use async_trait::async_trait;
use rampart_approval::{
    ApprovalDecision, ApprovalHandler, ApprovalRequest, ApprovalResponse, RollbackHook,
};
use rampart_core::{ErrorContext, FixSuggestion, UndoPoint};
use rampart_recovery::RecoveryDecider;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Approval handler answering from a queue.
///
/// Queued answers are used first, in order; after that every request gets
/// the default. A queued or default `None` means "no answer", which the
/// ledger turns into a deferral. Clones share the queue, the recorded
/// requests and the availability flag.
#[derive(Debug, Clone)]
pub struct ScriptedHandler {
    responses: Arc<Mutex<VecDeque<Option<ApprovalDecision>>>>,
    default: Option<ApprovalDecision>,
    requests: Arc<Mutex<Vec<ApprovalRequest>>>,
    available: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl ScriptedHandler {
    /// A handler that rejects anything not queued.
    #[must_use]
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            default: Some(ApprovalDecision::reject("no scripted answer")),
            requests: Arc::new(Mutex::new(Vec::new())),
            available: Arc::new(AtomicBool::new(true)),
            delay: None,
        }
    }

    /// A handler that approves everything.
    #[must_use]
    pub fn approving() -> Self {
        Self::new().with_default(ApprovalDecision::Approve)
    }

    /// Queue an answer.
    #[must_use]
    pub fn with_response(self, decision: ApprovalDecision) -> Self {
        self.queue(decision);
        self
    }

    /// Answer for requests once the queue is empty.
    #[must_use]
    pub fn with_default(mut self, decision: ApprovalDecision) -> Self {
        self.default = Some(decision);
        self
    }

    /// Return no answer once the queue is empty.
    #[must_use]
    pub fn with_no_response(mut self) -> Self {
        self.default = None;
        self
    }

    /// Wait this long before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an answer.
    pub fn queue(&self, decision: ApprovalDecision) {
        if let Ok(mut guard) = self.responses.lock() {
            guard.push_back(Some(decision));
        }
    }

    /// Queue a non-answer.
    pub fn queue_silence(&self) {
        if let Ok(mut guard) = self.responses.lock() {
            guard.push_back(None);
        }
    }

    /// Report the handler as reachable or not.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    /// Number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|g| g.len()).unwrap_or_default()
    }

    /// Targets of every request received, in order.
    #[must_use]
    pub fn requested_targets(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| r.operation.target)
            .collect()
    }
}

impl Default for ScriptedHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalHandler for ScriptedHandler {
    async fn request_approval(&self, request: ApprovalRequest) -> Option<ApprovalResponse> {
        let id = request.id;
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.responses.lock().ok().and_then(|mut g| g.pop_front());
        let decision = match scripted {
            Some(answer) => answer,
            None => self.default.clone(),
        };
        tracing::debug!(request_id = %id, ?decision, "Scripted approval answer");
        decision.map(|d| ApprovalResponse::new(id, d))
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// What a [`ScriptedDecider`] was shown.
#[derive(Debug, Clone)]
pub struct Presentation {
    /// The error.
    pub context: ErrorContext,
    /// Suggestions offered, best first.
    pub suggestions: Vec<FixSuggestion>,
}

/// Recovery decider choosing from a queue of indices.
///
/// `None` declines. Once the queue is empty the default applies, which
/// picks the first suggestion.
#[derive(Debug, Clone)]
pub struct ScriptedDecider {
    choices: Arc<Mutex<VecDeque<Option<usize>>>>,
    default: Option<usize>,
    shown: Arc<Mutex<Vec<Presentation>>>,
}

impl ScriptedDecider {
    /// A decider that picks the first suggestion.
    #[must_use]
    pub fn new() -> Self {
        Self {
            choices: Arc::new(Mutex::new(VecDeque::new())),
            default: Some(0),
            shown: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A decider that always declines.
    #[must_use]
    pub fn declining() -> Self {
        Self {
            default: None,
            ..Self::new()
        }
    }

    /// Queue a choice.
    #[must_use]
    pub fn with_choice(self, choice: Option<usize>) -> Self {
        if let Ok(mut guard) = self.choices.lock() {
            guard.push_back(choice);
        }
        self
    }

    /// Everything presented so far.
    #[must_use]
    pub fn presentations(&self) -> Vec<Presentation> {
        self.shown.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of times the decider was consulted.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.shown.lock().map(|g| g.len()).unwrap_or_default()
    }
}

impl Default for ScriptedDecider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecoveryDecider for ScriptedDecider {
    async fn choose(&self, context: &ErrorContext, suggestions: &[FixSuggestion]) -> Option<usize> {
        if let Ok(mut guard) = self.shown.lock() {
            guard.push(Presentation {
                context: context.clone(),
                suggestions: suggestions.to_vec(),
            });
        }
        let scripted = self.choices.lock().ok().and_then(|mut g| g.pop_front());
        match scripted {
            Some(choice) => choice,
            None => self.default,
        }
    }
}

/// Rollback hook that records what it was asked to do.
///
/// Confirms unless built with [`vetoing`](Self::vetoing); inverse commands
/// are recorded and reported as succeeded unless built with
/// [`failing_inverses`](Self::failing_inverses).
#[derive(Debug, Clone)]
pub struct RecordingRollback {
    confirm: bool,
    inverses_succeed: bool,
    confirmed: Arc<Mutex<Vec<UndoPoint>>>,
    inverses: Arc<Mutex<Vec<String>>>,
}

impl RecordingRollback {
    /// Confirm every rollback and accept every inverse.
    #[must_use]
    pub fn new() -> Self {
        Self {
            confirm: true,
            inverses_succeed: true,
            confirmed: Arc::new(Mutex::new(Vec::new())),
            inverses: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Veto every rollback.
    #[must_use]
    pub fn vetoing() -> Self {
        Self {
            confirm: false,
            ..Self::new()
        }
    }

    /// Report every inverse command as failed.
    #[must_use]
    pub fn failing_inverses() -> Self {
        Self {
            inverses_succeed: false,
            ..Self::new()
        }
    }

    /// Undo points the hook was asked about.
    #[must_use]
    pub fn points(&self) -> Vec<UndoPoint> {
        self.confirmed.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Inverse commands the hook was asked to run, in order.
    #[must_use]
    pub fn inverses(&self) -> Vec<String> {
        self.inverses.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl Default for RecordingRollback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RollbackHook for RecordingRollback {
    async fn confirm(&self, point: &UndoPoint) -> bool {
        if let Ok(mut guard) = self.confirmed.lock() {
            guard.push(point.clone());
        }
        self.confirm
    }

    async fn run_inverse(&self, command: &str) -> bool {
        if let Ok(mut guard) = self.inverses.lock() {
            guard.push(command.to_string());
        }
        self.inverses_succeed
    }
}
