// src/process/queue.rs

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{Actor, BuildRef, Parameters};

/// One build waiting to be promoted, with the parameters captured when it
/// was queued.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedPromotion {
    pub target: BuildRef,
    pub parameters: Parameters,
    /// Who asked for it, when it was forced or approved.
    pub requested_by: Option<Actor>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedPromotion {
    pub fn new(target: BuildRef, parameters: Parameters, requested_by: Option<Actor>) -> Self {
        Self {
            target,
            parameters,
            requested_by,
            enqueued_at: Utc::now(),
        }
    }
}

/// Result of asking the queue for the next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// Queued, and the process was idle: the caller should dispatch a run.
    Dispatch,
    /// Queued behind a run in progress.
    Waiting,
    /// The target was already waiting.
    Duplicate,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<QueuedPromotion>,
    busy: bool,
}

/// Per-process FIFO of targets plus the "a run is in progress" flag.
///
/// Semantics:
/// - A target appears at most once among the waiting entries.
/// - At most one run per process is in progress. `enqueue` reports whether
///   the caller should dispatch one; `finish` reports whether the backlog
///   warrants dispatching the next.
/// - The run itself removes its entry with `take_next` at start.
#[derive(Debug, Default)]
pub struct PromotionQueue {
    state: Mutex<QueueState>,
}

impl PromotionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn enqueue(&self, entry: QueuedPromotion) -> Enqueued {
        let mut state = self.lock();
        if state.pending.iter().any(|p| p.target == entry.target) {
            debug!(target_build = %entry.target, "target already queued");
            return Enqueued::Duplicate;
        }

        debug!(target_build = %entry.target, waiting = state.pending.len(), "queued promotion");
        state.pending.push_back(entry);

        if state.busy {
            Enqueued::Waiting
        } else {
            state.busy = true;
            Enqueued::Dispatch
        }
    }

    /// Remove the oldest waiting entry. Called by a run when it starts.
    pub fn take_next(&self) -> Option<QueuedPromotion> {
        self.lock().pending.pop_front()
    }

    /// Mark the current run as done. Returns `true` if entries are waiting,
    /// in which case the process stays claimed and the caller must dispatch
    /// the next run.
    pub fn finish(&self) -> bool {
        let mut state = self.lock();
        if state.pending.is_empty() {
            state.busy = false;
            false
        } else {
            debug!(waiting = state.pending.len(), "draining promotion backlog");
            true
        }
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// No run in progress and nothing waiting.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        !state.busy && state.pending.is_empty()
    }

    pub fn pending_targets(&self) -> Vec<BuildRef> {
        self.lock()
            .pending
            .iter()
            .map(|p| p.target.clone())
            .collect()
    }

    /// Drop every waiting entry (the process was archived).
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        dropped
    }
}
