// Completion signal for one timed game phase.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    TimedOut,
}

/// Completed at most once; handlers check `is_completed` so late input is inert.
#[derive(Debug, Default)]
pub struct Phase {
    completed: AtomicBool,
    notify: Notify,
}

impl Phase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Marks the phase complete. Returns false if it already was.
    pub fn complete(&self) -> bool {
        if self.completed.swap(true, Ordering::SeqCst) {
            return false;
        }
        // Stores a permit if the engine has not started waiting yet.
        self.notify.notify_one();
        true
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub async fn wait(&self, limit: Duration) -> PhaseOutcome {
        match tokio::time::timeout(limit, self.notify.notified()).await {
            Ok(()) => PhaseOutcome::Completed,
            Err(_) if self.is_completed() => PhaseOutcome::Completed,
            Err(_) => PhaseOutcome::TimedOut,
        }
    }
}
