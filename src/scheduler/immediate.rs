use super::{Action, Scheduler, Worker, WorkerRef};
use crate::error::{Error, Result};
use crate::runtime;
use crate::subscription::{self, BooleanSubscription, Subscription, SubscriptionRef};
use crate::util::panic::run_contained;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Runs every action inline on the thread that schedules it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl ImmediateScheduler {
    pub fn new() -> Self {
        ImmediateScheduler
    }
}

impl Scheduler for ImmediateScheduler {
    fn create_worker(&self) -> Result<WorkerRef> {
        Ok(Arc::new(ImmediateWorker::new()))
    }
}

/// Inline worker. `schedule` returns only after the action has run, and
/// `schedule_after` sleeps the caller for the delay first.
#[derive(Debug, Default)]
pub struct ImmediateWorker {
    state: BooleanSubscription,
}

impl ImmediateWorker {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(&self, action: Action) -> SubscriptionRef {
        if self.state.is_unsubscribed() {
            return subscription::unsubscribed();
        }
        if let Err(message) = run_contained(action) {
            runtime::report_error(Error::ActionPanicked(message));
        }
        // nothing left to cancel
        subscription::unsubscribed()
    }
}

impl Subscription for ImmediateWorker {
    fn unsubscribe(&self) -> Result<()> {
        self.state.unsubscribe()
    }

    fn is_unsubscribed(&self) -> bool {
        self.state.is_unsubscribed()
    }
}

impl Worker for ImmediateWorker {
    fn schedule(&self, action: Action) -> SubscriptionRef {
        self.run(action)
    }

    fn schedule_after(&self, action: Action, delay: Duration) -> SubscriptionRef {
        if !delay.is_zero() && !self.state.is_unsubscribed() {
            thread::sleep(delay);
        }
        self.run(action)
    }

    fn is_inline(&self) -> bool {
        true
    }
}
