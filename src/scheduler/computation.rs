use super::event_loop::{EventLoopThread, EventLoopWorker};
use super::metrics::EventLoopMetricsSnapshot;
use super::{Scheduler, WorkerRef};
use crate::config::Config;
use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info};

/// Fixed pool of event loops for CPU-bound work.
///
/// Each worker is pinned to one loop, chosen round-robin, which keeps its
/// actions serial while many workers share the pool.
pub struct ComputationScheduler {
    loops: Vec<EventLoopThread>,
    next: AtomicUsize,
    shutdown: AtomicBool,
}

impl ComputationScheduler {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let num_threads = config.worker_threads();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let mut loops = Vec::with_capacity(num_threads);
        for id in 0..num_threads {
            let name = config.thread_name(format_args!("computation-{}", id));
            match EventLoopThread::spawn(name, config) {
                Ok(event_loop) => loops.push(event_loop),
                Err(e) => {
                    for started in &loops {
                        started.shutdown();
                    }
                    return Err(e);
                }
            }
        }

        info!(threads = num_threads, "computation scheduler started");

        Ok(Self {
            loops,
            next: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.loops.len()
    }

    pub fn thread_ids(&self) -> Vec<ThreadId> {
        self.loops.iter().map(|l| l.thread_id()).collect()
    }

    pub fn owns_current_thread(&self) -> bool {
        self.owns_thread(thread::current().id())
    }

    pub fn owns_thread(&self, id: ThreadId) -> bool {
        self.loops.iter().any(|l| l.thread_id() == id)
    }

    /// Counters summed over every loop in the pool.
    pub fn metrics(&self) -> EventLoopMetricsSnapshot {
        self.loops
            .iter()
            .map(|l| l.queue().metrics())
            .fold(EventLoopMetricsSnapshot::default(), |acc, m| acc + m)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stops every loop, dropping pending actions, and joins the threads.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        for event_loop in &self.loops {
            event_loop.shutdown();
        }
        debug!(threads = self.loops.len(), "computation scheduler stopped");
    }
}

impl Scheduler for ComputationScheduler {
    fn create_worker(&self) -> Result<WorkerRef> {
        if self.is_shutdown() {
            return Err(Error::SchedulerShutdown);
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.loops.len();
        Ok(Arc::new(EventLoopWorker::new(self.loops[idx].queue().clone())))
    }
}

impl Drop for ComputationScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ComputationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputationScheduler")
            .field("threads", &self.loops.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
