use super::event_loop::{EventLoopThread, EventLoopWorker};
use super::{Action, Scheduler, Worker, WorkerRef};
use crate::config::Config;
use crate::error::Result;
use crate::subscription::{Subscription, SubscriptionRef};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;
use tracing::debug;

/// Gives every worker its own freshly spawned thread.
#[derive(Debug)]
pub struct NewThreadScheduler {
    config: Config,
    counter: AtomicUsize,
}

impl NewThreadScheduler {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            counter: AtomicUsize::new(0),
        }
    }

    /// Spawns the worker's thread; fails if the thread cannot start.
    pub fn spawn_worker(&self) -> Result<NewThreadWorker> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        let event_loop =
            EventLoopThread::spawn(self.config.thread_name(format_args!("newthread-{}", id)), &self.config)?;
        debug!(name = %event_loop.name(), "new-thread worker started");

        Ok(NewThreadWorker {
            inner: EventLoopWorker::new(event_loop.queue().clone()),
            event_loop,
        })
    }
}

impl Default for NewThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for NewThreadScheduler {
    fn create_worker(&self) -> Result<WorkerRef> {
        Ok(Arc::new(self.spawn_worker()?))
    }
}

/// A worker that owns its thread; unsubscribing it lets the thread exit
/// once the running action, if any, returns.
pub struct NewThreadWorker {
    inner: EventLoopWorker,
    event_loop: EventLoopThread,
}

impl NewThreadWorker {
    pub fn thread_id(&self) -> ThreadId {
        self.event_loop.thread_id()
    }
}

impl Subscription for NewThreadWorker {
    fn unsubscribe(&self) -> Result<()> {
        let result = self.inner.unsubscribe();
        // never joins: this may be running on the worker's own thread
        self.event_loop.signal_shutdown();
        result
    }

    fn is_unsubscribed(&self) -> bool {
        self.inner.is_unsubscribed()
    }
}

impl Worker for NewThreadWorker {
    fn schedule(&self, action: Action) -> SubscriptionRef {
        self.inner.schedule(action)
    }

    fn schedule_after(&self, action: Action, delay: Duration) -> SubscriptionRef {
        self.inner.schedule_after(action, delay)
    }
}

impl Drop for NewThreadWorker {
    fn drop(&mut self) {
        self.event_loop.signal_shutdown();
    }
}

impl fmt::Debug for NewThreadWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewThreadWorker")
            .field("thread_id", &self.thread_id())
            .field("unsubscribed", &self.is_unsubscribed())
            .finish()
    }
}
