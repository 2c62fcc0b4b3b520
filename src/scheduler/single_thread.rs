use super::event_loop::{EventLoopThread, EventLoopWorker};
use super::metrics::EventLoopMetricsSnapshot;
use super::{Scheduler, WorkerRef};
use crate::config::Config;
use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use tracing::debug;

static INSTANCE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A scheduler that owns exactly one thread for its whole life.
///
/// Every worker it creates feeds the same queue, so all work submitted
/// through this scheduler runs serially on that one thread, in the style of
/// a UI event loop. The thread belongs to whoever constructed the scheduler;
/// call [`shutdown`](SingleThreadScheduler::shutdown) (or drop it) to
/// release it.
///
/// Construction waits for the thread to report ready, bounded by
/// [`Config::bootstrap_timeout`], and fails with
/// [`Error::BootstrapTimeout`] instead of hanging.
pub struct SingleThreadScheduler {
    event_loop: EventLoopThread,
    shutdown: AtomicBool,
}

impl SingleThreadScheduler {
    pub fn new() -> Result<Self> {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Result<Self> {
        let id = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::named(config.thread_name(format_args!("single-{}", id)), config)
    }

    /// Builds a scheduler whose thread carries exactly `name`.
    pub fn named<S: Into<String>>(name: S, config: &Config) -> Result<Self> {
        config.validate()?;
        let event_loop = EventLoopThread::spawn(name.into(), config)?;
        debug!(name = %event_loop.name(), thread = ?event_loop.thread_id(), "single-thread scheduler ready");

        Ok(Self {
            event_loop,
            shutdown: AtomicBool::new(false),
        })
    }

    /// The thread every action of this scheduler runs on.
    pub fn thread_id(&self) -> ThreadId {
        self.event_loop.thread_id()
    }

    pub fn is_current(&self) -> bool {
        self.event_loop.is_current()
    }

    pub fn name(&self) -> &str {
        self.event_loop.name()
    }

    pub fn metrics(&self) -> EventLoopMetricsSnapshot {
        self.event_loop.queue().metrics()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stops accepting work, drops pending actions and releases the thread.
    /// An action running at the time finishes first. Safe to call from the
    /// scheduler's own thread; the join is skipped there.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.event_loop.shutdown();
        debug!(name = %self.event_loop.name(), "single-thread scheduler stopped");
    }
}

impl Scheduler for SingleThreadScheduler {
    fn create_worker(&self) -> Result<WorkerRef> {
        if self.is_shutdown() {
            return Err(Error::SchedulerShutdown);
        }
        Ok(Arc::new(EventLoopWorker::new(self.event_loop.queue().clone())))
    }
}

impl Drop for SingleThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for SingleThreadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleThreadScheduler")
            .field("name", &self.name())
            .field("thread_id", &self.thread_id())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
