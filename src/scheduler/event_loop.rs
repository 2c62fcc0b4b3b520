//! The thread-backed lane shared by every non-inline scheduler.
//!
//! An [`EventLoopThread`] owns one OS thread draining a deadline-ordered
//! queue. Entries become eligible at their due instant and, among equally
//! due entries, run in submission order. Workers handed out by the
//! schedulers are thin [`EventLoopWorker`] views onto one such queue, each
//! with its own cancellation set, so several workers can share a thread
//! while each keeps FIFO order for its own actions.

use super::metrics::{EventLoopMetrics, EventLoopMetricsSnapshot};
use super::task::{ScheduledTask, TaskId, TaskOutcome};
use super::{Action, Worker};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::runtime;
use crate::subscription::{self, BooleanSubscription, CompositeSubscription, Subscription, SubscriptionRef};
use crossbeam_channel::RecvTimeoutError;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Heap key of a queued task. The task itself lives in `QueueState::tasks`;
/// a key whose task is gone was cancelled and is skipped.
struct Entry {
    due: Instant,
    seq: u64,
    id: TaskId,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap is a max-heap: the earliest deadline, then the lowest
    // sequence number, must compare greatest
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Entry>,
    tasks: HashMap<TaskId, ScheduledTask>,
    next_seq: u64,
    closed: bool,
}

impl QueueState {
    // stale keys may outnumber live ones by this much before a rebuild
    const STALE_SLACK: usize = 64;

    fn compact(&mut self) {
        if self.heap.len() > 2 * self.tasks.len() + Self::STALE_SLACK {
            let tasks = &self.tasks;
            self.heap.retain(|e| tasks.contains_key(&e.id));
        }
    }
}

/// Deadline-ordered run queue of a single loop thread.
pub(crate) struct LoopQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    metrics: EventLoopMetrics,
}

impl LoopQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            metrics: EventLoopMetrics::new(),
        }
    }

    /// Enqueues `task`. Hands the task back if the loop is closed.
    fn push(
        &self,
        task: ScheduledTask,
        delay: Option<Duration>,
    ) -> std::result::Result<(), ScheduledTask> {
        let mut state = self.state.lock();
        if state.closed {
            self.metrics.record_rejected();
            return Err(task);
        }

        // taken under the lock so due order agrees with sequence order
        let now = Instant::now();
        let due = match delay {
            Some(d) => now + d,
            None => now,
        };
        let seq = state.next_seq;
        state.next_seq += 1;
        let id = task.id;
        state.heap.push(Entry { due, seq, id });
        state.tasks.insert(id, task);
        self.metrics.record_scheduled();
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Blocks until an entry is due. `None` once the queue is closed.
    fn next(&self) -> Option<ScheduledTask> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            let now = Instant::now();
            match state.heap.peek().map(|e| (e.due, e.id)) {
                Some((_, id)) if !state.tasks.contains_key(&id) => {
                    state.heap.pop();
                }
                Some((due, id)) if due <= now => {
                    state.heap.pop();
                    return state.tasks.remove(&id);
                }
                Some((due, _)) => {
                    self.available.wait_until(&mut state, due);
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    /// Takes a cancelled task out of the heap so its action, and whatever
    /// it captured, is dropped now instead of at its due instant.
    fn remove(&self, id: TaskId) {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.tasks.remove(&id);
            if removed.is_some() {
                state.compact();
            }
            removed
        };
        // dropped outside the lock, like in close
        if let Some(task) = removed {
            self.metrics.record_cancelled();
            task.discard();
        }
    }

    /// Refuses further work and drops pending entries. Returns how many
    /// entries were dropped.
    fn close(&self) -> usize {
        let pending = {
            let mut state = self.state.lock();
            state.closed = true;
            state.heap.clear();
            std::mem::take(&mut state.tasks)
        };
        self.available.notify_all();
        // dropped outside the lock: captured state may schedule on drop
        let dropped = pending.len();
        drop(pending);
        dropped
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn metrics(&self) -> EventLoopMetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn run_loop(queue: &LoopQueue) {
    debug!(thread = ?thread::current().name(), "event loop started");

    while let Some(task) = queue.next() {
        let id = task.id;
        match task.run() {
            TaskOutcome::Executed => queue.metrics.record_executed(),
            TaskOutcome::Cancelled => queue.metrics.record_cancelled(),
            TaskOutcome::Panicked(message) => {
                queue.metrics.record_panicked();
                debug!(task = ?id, "scheduled action panicked");
                runtime::report_error(Error::ActionPanicked(message));
            }
        }
    }

    debug!(thread = ?thread::current().name(), "event loop stopped");
}

/// One OS thread running [`run_loop`] for its whole life.
pub(crate) struct EventLoopThread {
    name: String,
    queue: Arc<LoopQueue>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventLoopThread {
    pub fn spawn(name: String, config: &Config) -> Result<Self> {
        Self::spawn_with(name, config, || {})
    }

    /// Spawns the loop thread and waits, at most `config.bootstrap_timeout`,
    /// for it to report ready. `before_ready` runs on the new thread first.
    pub(crate) fn spawn_with<F>(name: String, config: &Config, before_ready: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let queue = Arc::new(LoopQueue::new());
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let loop_queue = queue.clone();
        let handle = builder.spawn(move || {
            before_ready();
            // the constructor may have given up on us already
            if ready_tx.send(thread::current().id()).is_err() {
                return;
            }
            run_loop(&loop_queue);
        })?;

        match ready_rx.recv_timeout(config.bootstrap_timeout) {
            Ok(thread_id) => Ok(Self {
                name,
                queue,
                thread_id,
                handle: Mutex::new(Some(handle)),
            }),
            Err(RecvTimeoutError::Timeout) => {
                queue.close();
                Err(Error::BootstrapTimeout {
                    name,
                    timeout: config.bootstrap_timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                queue.close();
                Err(Error::scheduler(format!("{} exited during startup", name)))
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &Arc<LoopQueue> {
        &self.queue
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn is_shut_down(&self) -> bool {
        self.queue.is_closed()
    }

    /// Stops the loop without waiting for the thread to exit.
    pub fn signal_shutdown(&self) {
        let dropped = self.queue.close();
        if dropped > 0 {
            debug!(name = %self.name, dropped, "dropped pending actions on shutdown");
        }
    }

    /// Stops the loop and joins the thread, unless called from the loop
    /// thread itself.
    pub fn shutdown(&self) {
        self.signal_shutdown();
        if self.is_current() {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!(name = %self.name, "event loop thread panicked");
            }
        }
    }
}

impl fmt::Debug for EventLoopThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoopThread")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// A serial lane on top of a shared [`LoopQueue`].
pub struct EventLoopWorker {
    queue: Arc<LoopQueue>,
    tasks: Arc<CompositeSubscription>,
}

impl EventLoopWorker {
    pub(crate) fn new(queue: Arc<LoopQueue>) -> Self {
        Self {
            queue,
            tasks: Arc::new(CompositeSubscription::new()),
        }
    }

    fn enqueue(&self, action: Action, delay: Option<Duration>) -> SubscriptionRef {
        if self.tasks.is_unsubscribed() {
            return subscription::unsubscribed();
        }

        // cancelling the token evicts the queued entry
        let id = TaskId::next();
        let queue = Arc::downgrade(&self.queue);
        let token = Arc::new(BooleanSubscription::with_action(move || {
            if let Some(queue) = queue.upgrade() {
                queue.remove(id);
            }
        }));
        let token_ref: SubscriptionRef = token.clone();
        if let Err(e) = self.tasks.add(token_ref.clone()) {
            runtime::report_error(e);
        }
        if token.is_unsubscribed() {
            // the worker was unsubscribed while we registered
            return token_ref;
        }

        let task = ScheduledTask::new(id, action, token, Some(self.tasks.clone()));
        if let Err(rejected) = self.queue.push(task, delay) {
            warn!(task = ?rejected.id, "event loop shut down; action rejected");
            self.tasks.forget(&token_ref);
            if let Err(e) = token_ref.unsubscribe() {
                runtime::report_error(e);
            }
        }
        token_ref
    }

    /// Actions accepted by this worker that have not started yet.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}

impl Subscription for EventLoopWorker {
    fn unsubscribe(&self) -> Result<()> {
        self.tasks.unsubscribe()
    }

    fn is_unsubscribed(&self) -> bool {
        self.tasks.is_unsubscribed()
    }
}

impl Worker for EventLoopWorker {
    fn schedule(&self, action: Action) -> SubscriptionRef {
        self.enqueue(action, None)
    }

    fn schedule_after(&self, action: Action, delay: Duration) -> SubscriptionRef {
        if delay.is_zero() {
            return self.enqueue(action, None);
        }
        self.enqueue(action, Some(delay))
    }
}

impl fmt::Debug for EventLoopWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoopWorker")
            .field("pending", &self.pending())
            .field("unsubscribed", &self.is_unsubscribed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn test_config() -> Config {
        Config::builder()
            .bootstrap_timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    fn spawn_loop(name: &str) -> EventLoopThread {
        EventLoopThread::spawn(name.to_string(), &test_config()).unwrap()
    }

    #[test]
    fn test_runs_on_loop_thread_in_order() {
        let event_loop = spawn_loop("test-order");
        let worker = EventLoopWorker::new(event_loop.queue().clone());
        let (tx, rx) = unbounded();

        for i in 0..100 {
            let tx = tx.clone();
            worker.schedule(Box::new(move || {
                tx.send((i, thread::current().id())).unwrap();
            }));
        }

        for expected in 0..100 {
            let (i, tid) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(i, expected);
            assert_eq!(tid, event_loop.thread_id());
        }

        event_loop.shutdown();
    }

    #[test]
    fn test_delay_is_a_minimum() {
        let event_loop = spawn_loop("test-delay");
        let worker = EventLoopWorker::new(event_loop.queue().clone());
        let (tx, rx) = unbounded();

        let start = Instant::now();
        worker.schedule_after(
            Box::new(move || tx.send(Instant::now()).unwrap()),
            Duration::from_millis(50),
        );

        let ran_at = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(ran_at.duration_since(start) >= Duration::from_millis(50));

        event_loop.shutdown();
    }

    #[test]
    fn test_delayed_action_does_not_block_immediate_ones() {
        let event_loop = spawn_loop("test-mixed");
        let worker = EventLoopWorker::new(event_loop.queue().clone());
        let (tx, rx) = unbounded();

        let late = tx.clone();
        worker.schedule_after(Box::new(move || late.send("late").unwrap()), Duration::from_millis(100));
        worker.schedule(Box::new(move || tx.send("now").unwrap()));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "now");
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "late");

        event_loop.shutdown();
    }

    #[test]
    fn test_cancelled_action_never_runs() {
        let event_loop = spawn_loop("test-cancel");
        let worker = EventLoopWorker::new(event_loop.queue().clone());
        let (tx, rx) = unbounded();

        let cancelled = tx.clone();
        let token = worker.schedule_after(
            Box::new(move || cancelled.send("cancelled").unwrap()),
            Duration::from_millis(30),
        );
        token.unsubscribe().unwrap();
        worker.schedule_after(Box::new(move || tx.send("marker").unwrap()), Duration::from_millis(60));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "marker");
        assert!(rx.try_recv().is_err());
        assert_eq!(event_loop.queue().metrics().cancelled, 1);

        event_loop.shutdown();
    }

    #[test]
    fn test_cancel_releases_captured_state() {
        let event_loop = spawn_loop("test-cancel-release");
        let worker = EventLoopWorker::new(event_loop.queue().clone());
        let payload = Arc::new(());

        let p = payload.clone();
        let token = worker.schedule_after(Box::new(move || drop(p)), Duration::from_secs(3600));
        assert_eq!(Arc::strong_count(&payload), 2);
        assert_eq!(worker.pending(), 1);

        token.unsubscribe().unwrap();
        assert_eq!(Arc::strong_count(&payload), 1);
        assert_eq!(worker.pending(), 0);
        assert_eq!(event_loop.queue().metrics().cancelled, 1);

        event_loop.shutdown();
    }

    #[test]
    fn test_worker_unsubscribe_releases_captured_state() {
        let event_loop = spawn_loop("test-worker-release");
        let worker = EventLoopWorker::new(event_loop.queue().clone());
        let other = EventLoopWorker::new(event_loop.queue().clone());
        let payload = Arc::new(());
        let (tx, rx) = unbounded();

        for _ in 0..3 {
            let p = payload.clone();
            worker.schedule_after(Box::new(move || drop(p)), Duration::from_secs(3600));
        }
        other.schedule_after(Box::new(move || tx.send("other").unwrap()), Duration::from_millis(20));
        assert_eq!(Arc::strong_count(&payload), 4);

        worker.unsubscribe().unwrap();
        assert_eq!(Arc::strong_count(&payload), 1);

        // the other worker's entry survives the purge
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "other");
        event_loop.shutdown();
    }

    #[test]
    fn test_unsubscribed_worker_drops_pending_and_refuses_new() {
        let event_loop = spawn_loop("test-worker-unsub");
        let worker = EventLoopWorker::new(event_loop.queue().clone());
        let (tx, rx) = unbounded();

        let pending = tx.clone();
        let token = worker.schedule_after(
            Box::new(move || pending.send("pending").unwrap()),
            Duration::from_millis(30),
        );
        worker.unsubscribe().unwrap();
        assert!(token.is_unsubscribed());

        let refused = worker.schedule(Box::new(move || tx.send("refused").unwrap()));
        assert!(refused.is_unsubscribed());

        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
        event_loop.shutdown();
    }

    #[test]
    fn test_workers_sharing_a_loop_are_independent() {
        let event_loop = spawn_loop("test-shared");
        let a = EventLoopWorker::new(event_loop.queue().clone());
        let b = EventLoopWorker::new(event_loop.queue().clone());
        let (tx, rx) = unbounded();

        a.unsubscribe().unwrap();
        b.schedule(Box::new(move || tx.send("b").unwrap()));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "b");
        event_loop.shutdown();
    }

    #[test]
    fn test_panicking_action_keeps_loop_alive() {
        let event_loop = spawn_loop("test-panic");
        let worker = EventLoopWorker::new(event_loop.queue().clone());
        let (tx, rx) = unbounded();

        worker.schedule(Box::new(|| panic!("boom")));
        worker.schedule(Box::new(move || tx.send("after").unwrap()));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "after");
        assert_eq!(event_loop.queue().metrics().panicked, 1);
        event_loop.shutdown();
    }

    #[test]
    fn test_schedule_after_shutdown_is_rejected() {
        let event_loop = spawn_loop("test-closed");
        let worker = EventLoopWorker::new(event_loop.queue().clone());
        event_loop.shutdown();

        let token = worker.schedule(Box::new(|| {}));
        assert!(token.is_unsubscribed());
        assert_eq!(event_loop.queue().metrics().rejected, 1);
    }

    #[test]
    fn test_bootstrap_timeout_fails_fast() {
        let config = Config::builder()
            .bootstrap_timeout(Duration::from_millis(20))
            .build()
            .unwrap();

        let start = Instant::now();
        let result = EventLoopThread::spawn_with("test-slow-start".to_string(), &config, || {
            thread::sleep(Duration::from_millis(300));
        });

        assert!(matches!(result, Err(Error::BootstrapTimeout { .. })));
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[test]
    fn test_shutdown_from_loop_thread_does_not_deadlock() {
        let event_loop = Arc::new(spawn_loop("test-self-shutdown"));
        let worker = EventLoopWorker::new(event_loop.queue().clone());
        let (tx, rx) = unbounded();

        let el = event_loop.clone();
        worker.schedule(Box::new(move || {
            el.shutdown();
            tx.send(()).unwrap();
        }));

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(event_loop.is_shut_down());
    }
}
