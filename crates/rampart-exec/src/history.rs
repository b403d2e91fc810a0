//! Bounded execution history and aggregate statistics.

use rampart_core::{CommandResult, ExecutionStatus};
use rampart_storage::JsonlLog;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ExecResult;

/// Number of failing commands reported in [`ExecutionStats::top_failures`].
const TOP_FAILURES: usize = 5;

struct HistoryState {
    entries: VecDeque<CommandResult>,
    /// Records in the backing file, live or not.
    persisted: usize,
}

/// Ring buffer of [`CommandResult`]s, optionally mirrored to a JSONL file.
///
/// The file is compacted back to the ring's contents once it holds more
/// than twice the capacity. Persistence failures are logged and never
/// surface to the caller.
pub struct CommandHistory {
    state: Mutex<HistoryState>,
    capacity: usize,
    log: Option<JsonlLog<CommandResult>>,
}

impl CommandHistory {
    /// In-memory history with `capacity` entries.
    #[must_use]
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            state: Mutex::new(HistoryState {
                entries: VecDeque::with_capacity(capacity),
                persisted: 0,
            }),
            capacity,
            log: None,
        }
    }

    /// Open a history persisted at `path`, keeping the most recent
    /// `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is corrupted or unreadable.
    pub fn open(capacity: usize, path: impl Into<PathBuf>) -> ExecResult<Self> {
        let log = JsonlLog::new(path);
        let mut loaded = log.load()?;
        let excess = loaded.len().saturating_sub(capacity);
        let persisted = loaded.len();
        loaded.drain(..excess);
        if excess > 0 {
            log.rewrite(&loaded)?;
        }
        tracing::debug!(
            path = %log.path().display(),
            entries = loaded.len(),
            "Loaded command history"
        );
        Ok(Self {
            state: Mutex::new(HistoryState {
                persisted: if excess > 0 { loaded.len() } else { persisted },
                entries: loaded.into(),
            }),
            capacity,
            log: Some(log),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(|e| {
            tracing::warn!("Command history lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Append a result, evicting the oldest when full.
    pub fn record(&self, result: &CommandResult) {
        let mut state = self.lock();
        state.entries.push_back(result.clone());
        while state.entries.len() > self.capacity {
            state.entries.pop_front();
        }

        let Some(log) = &self.log else {
            return;
        };
        if let Err(e) = log.append(result) {
            tracing::warn!(error = %e, "Failed to persist command history entry");
            return;
        }
        state.persisted = state.persisted.saturating_add(1);
        if state.persisted > self.capacity.saturating_mul(2) {
            let live: Vec<CommandResult> = state.entries.iter().cloned().collect();
            match log.rewrite(&live) {
                Ok(()) => state.persisted = live.len(),
                Err(e) => tracing::warn!(error = %e, "Failed to compact command history"),
            }
        }
    }

    /// All retained results, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<CommandResult> {
        self.lock().entries.iter().cloned().collect()
    }

    /// The `n` most recent results, most recent first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<CommandResult> {
        self.lock().entries.iter().rev().take(n).cloned().collect()
    }

    /// Number of retained results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Check if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of retained results.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Statistics over the retained results.
    #[must_use]
    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats::from_results(self.lock().entries.iter())
    }
}

impl std::fmt::Debug for CommandHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHistory")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("persisted", &self.log.as_ref().map(JsonlLog::path))
            .finish()
    }
}

/// Aggregate view of the history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStats {
    /// Results counted, blocked ones included.
    pub total: usize,
    /// Count per final status.
    pub by_status: HashMap<ExecutionStatus, usize>,
    /// Successes over all counted results, `0.0` when empty.
    pub success_rate: f64,
    /// Mean duration of results that actually spawned a process.
    pub mean_duration: Duration,
    /// Most frequent failing or timed-out commands with their counts.
    pub top_failures: Vec<(String, usize)>,
}

impl ExecutionStats {
    /// Compute statistics over `results`.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a CommandResult>) -> Self {
        let mut stats = Self::default();
        let mut spawned: u64 = 0;
        let mut total_ms: u64 = 0;
        let mut failures: HashMap<&str, usize> = HashMap::new();

        for result in results {
            stats.total = stats.total.saturating_add(1);
            let count = stats.by_status.entry(result.status).or_insert(0);
            *count = count.saturating_add(1);

            if !matches!(
                result.status,
                ExecutionStatus::Blocked | ExecutionStatus::SpawnFailed
            ) {
                spawned = spawned.saturating_add(1);
                total_ms = total_ms.saturating_add(result.duration_ms);
            }
            if matches!(
                result.status,
                ExecutionStatus::Failure | ExecutionStatus::Timeout
            ) {
                let count = failures.entry(result.command.as_str()).or_insert(0);
                *count = count.saturating_add(1);
            }
        }

        if stats.total > 0 {
            stats.success_rate = stats.count(ExecutionStatus::Success) as f64 / stats.total as f64;
        }
        stats.mean_duration = Duration::from_millis(total_ms.checked_div(spawned).unwrap_or(0));

        let mut top: Vec<(String, usize)> = failures
            .into_iter()
            .map(|(command, count)| (command.to_string(), count))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(TOP_FAILURES);
        stats.top_failures = top;
        stats
    }

    /// Number of results with `status`.
    #[must_use]
    pub fn count(&self, status: ExecutionStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}
