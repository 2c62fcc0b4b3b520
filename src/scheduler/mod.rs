//! Schedulers and the serial workers they hand out.
//!
//! A [`Scheduler`] is a factory for [`Worker`]s. Whatever execution
//! strategy backs it, every worker is a strictly serial lane: actions
//! scheduled on one worker run one at a time, in submission order. There
//! is no ordering between different workers.
//!
//! Variants:
//!
//! - [`ComputationScheduler`]: a fixed pool of event-loop threads; workers
//!   are spread over the loops round-robin.
//! - [`SingleThreadScheduler`]: one dedicated thread; every worker shares
//!   its queue, so the whole scheduler acts as one serial lane.
//! - [`NewThreadScheduler`]: a fresh thread per worker.
//! - [`ImmediateScheduler`]: runs actions inline on the caller.

pub mod computation;
pub mod event_loop;
pub mod immediate;
pub mod metrics;
pub mod new_thread;
pub mod single_thread;
pub mod task;

pub use computation::ComputationScheduler;
pub use event_loop::EventLoopWorker;
pub use immediate::{ImmediateScheduler, ImmediateWorker};
pub use metrics::{EventLoopMetrics, EventLoopMetricsSnapshot};
pub use new_thread::{NewThreadScheduler, NewThreadWorker};
pub use single_thread::SingleThreadScheduler;
pub use task::TaskId;

use crate::error::{Error, Result};
use crate::runtime;
use crate::subscription::{self, SerialSubscription, Subscription, SubscriptionRef};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A unit of work handed to a worker.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// An action that can run repeatedly, for periodic scheduling.
pub type RepeatingAction = Arc<dyn Fn() + Send + Sync + 'static>;

/// A strictly serial execution lane.
///
/// Unsubscribing a worker drops its not-yet-started actions and makes all
/// later `schedule*` calls return an already-unsubscribed token. An action
/// that is already running is never interrupted.
pub trait Worker: Subscription {
    /// Enqueues `action` to run as soon as possible. Never blocks the
    /// caller on thread-backed workers.
    ///
    /// Unsubscribing the returned token before the action starts
    /// guarantees it never runs.
    fn schedule(&self, action: Action) -> SubscriptionRef;

    /// Like [`schedule`](Worker::schedule), but the action does not start
    /// before `delay` has elapsed.
    fn schedule_after(&self, action: Action, delay: Duration) -> SubscriptionRef;

    /// Whether `schedule` runs the action before returning.
    fn is_inline(&self) -> bool {
        false
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

pub trait Scheduler: Send + Sync {
    /// Returns a fresh serial worker.
    fn create_worker(&self) -> Result<WorkerRef>;

    fn now(&self) -> Instant {
        Instant::now()
    }
}

pub type WorkerRef = Arc<dyn Worker>;
pub type SchedulerRef = Arc<dyn Scheduler>;

/// Views a worker as a plain cancellation token.
pub fn worker_subscription(worker: &WorkerRef) -> SubscriptionRef {
    Arc::new(worker.clone())
}

struct Periodic {
    worker: WorkerRef,
    action: RepeatingAction,
    serial: Arc<SerialSubscription>,
    period: Duration,
    next_due: Mutex<Instant>,
    next_generation: AtomicU64,
    installed: Mutex<u64>,
}

impl Periodic {
    fn schedule_next(this: &Arc<Self>, delay: Duration) {
        let generation = this.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let me = this.clone();
        let token = this.worker.schedule_after(Box::new(move || me.tick()), delay);
        this.install(generation, token);
    }

    /// A tick can run, and install its successor, before the thread that
    /// scheduled it gets here. An older token never replaces a newer one.
    fn install(&self, generation: u64, token: SubscriptionRef) {
        let mut installed = self.installed.lock();
        if generation < *installed {
            return;
        }
        *installed = generation;
        if let Err(e) = self.serial.set(token) {
            runtime::report_error(e);
        }
    }

    fn tick(self: Arc<Self>) {
        if self.serial.is_unsubscribed() {
            return;
        }
        (self.action)();

        // fixed rate: measured from the first due instant, not from now
        let delay = {
            let mut next_due = self.next_due.lock();
            *next_due += self.period;
            next_due.saturating_duration_since(self.worker.now())
        };
        Self::schedule_next(&self, delay);
    }
}

/// Runs `action` on `worker` after `initial_delay`, then every `period`,
/// until the returned token or the worker is unsubscribed.
///
/// Inline workers are refused: the error is reported and the returned
/// token is already unsubscribed.
pub fn schedule_periodically(
    worker: &WorkerRef,
    action: RepeatingAction,
    initial_delay: Duration,
    period: Duration,
) -> SubscriptionRef {
    if worker.is_inline() {
        runtime::report_error(Error::scheduler("periodic scheduling needs a worker that runs actions asynchronously"));
        return subscription::unsubscribed();
    }

    let serial = Arc::new(SerialSubscription::new());
    let periodic = Arc::new(Periodic {
        worker: worker.clone(),
        action,
        serial: serial.clone(),
        period,
        next_due: Mutex::new(worker.now() + initial_delay),
        next_generation: AtomicU64::new(0),
        installed: Mutex::new(0),
    });
    Periodic::schedule_next(&periodic, initial_delay);
    serial
}
