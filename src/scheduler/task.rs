//! Queued unit of work.

use super::Action;
use crate::subscription::{BooleanSubscription, CompositeSubscription, SubscriptionRef};
use crate::util::panic::run_contained;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Global task ID counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a scheduled action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) enum TaskOutcome {
    Executed,
    /// The token was unsubscribed before the action could start.
    Cancelled,
    Panicked(String),
}

pub(crate) struct ScheduledTask {
    pub(crate) id: TaskId,
    func: Action,
    token: Arc<BooleanSubscription>,
    // worker-level registry the token lives in until the task is done
    tracker: Option<Arc<CompositeSubscription>>,
    pub(crate) submitted_at: Instant,
}

impl ScheduledTask {
    pub fn new(
        id: TaskId,
        func: Action,
        token: Arc<BooleanSubscription>,
        tracker: Option<Arc<CompositeSubscription>>,
    ) -> Self {
        ScheduledTask {
            id,
            func,
            token,
            tracker,
            submitted_at: Instant::now(),
        }
    }

    /// Runs the action unless its token was unsubscribed first.
    ///
    /// Starting and cancelling race on the same compare-exchange, so exactly
    /// one of them wins.
    pub fn run(self) -> TaskOutcome {
        let ScheduledTask {
            func,
            token,
            tracker,
            ..
        } = self;

        let claimed = token.mark_unsubscribed();
        if let Some(tracker) = tracker {
            let token: SubscriptionRef = token;
            tracker.forget(&token);
        }

        if !claimed {
            return TaskOutcome::Cancelled;
        }

        match run_contained(func) {
            Ok(()) => TaskOutcome::Executed,
            Err(message) => TaskOutcome::Panicked(message),
        }
    }

    /// Drops a task whose token was cancelled while it was still queued.
    pub(crate) fn discard(self) {
        if let Some(tracker) = &self.tracker {
            let token: SubscriptionRef = self.token.clone();
            tracker.forget(&token);
        }
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("submitted_at", &self.submitted_at)
            .finish()
    }
}
