//! Per-occurrence recovery state machine.
//!
//! ```text
//! Raised -> Analyzed -> FixSuggested -> FixApplied -> Resolved
//!                  |            |                 \-> Failed
//!                  \------------+-> ManualFallback
//! ```
//!
//! `FixSuggested -> ManualFallback` covers a declined or unappliable
//! suggestion. `Resolved`, `Failed` and `ManualFallback` are terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RecoveryError, RecoveryResult};

/// Where an error occurrence stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    /// The failure was reported.
    Raised,
    /// The failure was classified.
    Analyzed,
    /// At least one suggestion cleared the confidence floor.
    FixSuggested,
    /// A fix was applied.
    FixApplied,
    /// The fix succeeded.
    Resolved,
    /// The fix failed.
    Failed,
    /// No automatic action; the raw context goes to a human.
    ManualFallback,
}

impl RecoveryState {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Failed | Self::ManualFallback)
    }

    /// Whether `self -> next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Raised, Self::Analyzed)
                | (Self::Analyzed, Self::FixSuggested | Self::ManualFallback)
                | (Self::FixSuggested, Self::FixApplied | Self::ManualFallback)
                | (Self::FixApplied, Self::Resolved | Self::Failed)
        )
    }
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Raised => "raised",
            Self::Analyzed => "analyzed",
            Self::FixSuggested => "fix_suggested",
            Self::FixApplied => "fix_applied",
            Self::Resolved => "resolved",
            Self::Failed => "failed",
            Self::ManualFallback => "manual_fallback",
        };
        f.write_str(s)
    }
}

/// Tracks one occurrence through the state machine.
#[derive(Debug, Clone)]
pub struct RecoveryTracker {
    visited: Vec<RecoveryState>,
}

impl Default for RecoveryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryTracker {
    /// A tracker in [`RecoveryState::Raised`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            visited: vec![RecoveryState::Raised],
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RecoveryState {
        self.visited
            .last()
            .copied()
            .unwrap_or(RecoveryState::Raised)
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::InvalidTransition`] if the move is not
    /// allowed from the current state.
    pub fn advance(&mut self, next: RecoveryState) -> RecoveryResult<()> {
        let from = self.state();
        if !from.can_transition_to(next) {
            return Err(RecoveryError::InvalidTransition { from, to: next });
        }
        tracing::trace!(%from, to = %next, "Recovery state transition");
        self.visited.push(next);
        Ok(())
    }

    /// Every state visited, in order.
    #[must_use]
    pub fn visited(&self) -> &[RecoveryState] {
        &self.visited
    }

    /// Consume the tracker, returning the visited states.
    #[must_use]
    pub fn into_visited(self) -> Vec<RecoveryState> {
        self.visited
    }
}
