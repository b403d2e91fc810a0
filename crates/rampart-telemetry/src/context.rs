//! Operation context for correlating log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Correlation data carried through one submission, execution or recovery
/// attempt.
///
/// Every context belongs to a session. Children share the session and
/// record their parent so nested work (a fix command run during a retry)
/// can be traced back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Unique id of this context.
    pub context_id: Uuid,
    /// Session the work belongs to.
    pub session_id: Uuid,
    /// Parent context, for nested work.
    pub parent_id: Option<Uuid>,
    /// Component that created the context (`ledger`, `executor`, `recovery`).
    pub component: String,
    /// What is being done (`submit_batch`, `execute`, `apply_fix`).
    pub operation: String,
    /// When the context was created.
    pub started_at: DateTime<Utc>,
    /// Extra fields.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl OperationContext {
    /// Start a context in a fresh session.
    #[must_use]
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::in_session(Uuid::new_v4(), component, operation)
    }

    /// Start a context in an existing session.
    #[must_use]
    pub fn in_session(
        session_id: Uuid,
        component: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            context_id: Uuid::new_v4(),
            session_id,
            parent_id: None,
            component: component.into(),
            operation: operation.into(),
            started_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Derive a child context in the same session.
    #[must_use]
    pub fn child(&self, component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            parent_id: Some(self.context_id),
            metadata: self.metadata.clone(),
            ..Self::in_session(self.session_id, component, operation)
        }
    }

    /// Add metadata.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Milliseconds since the context was created.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// A span carrying the correlation fields.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "operation",
            session_id = %self.session_id,
            context_id = %self.context_id,
            parent_id = ?self.parent_id,
            component = %self.component,
            operation = %self.operation,
        )
    }

    /// First eight characters of the context id.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.context_id.simple().to_string().chars().take(8).collect()
    }
}

/// Enters a context's span and logs its completion time on drop.
pub struct OperationGuard {
    context: OperationContext,
    _span: tracing::span::EnteredSpan,
}

impl OperationGuard {
    /// Enter the span of `context`.
    #[must_use]
    pub fn new(context: OperationContext) -> Self {
        let span = context.span().entered();
        tracing::debug!("operation started");
        Self {
            context,
            _span: span,
        }
    }

    /// The guarded context.
    #[must_use]
    pub fn context(&self) -> &OperationContext {
        &self.context
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        tracing::debug!(elapsed_ms = self.context.elapsed_ms(), "operation completed");
    }
}
