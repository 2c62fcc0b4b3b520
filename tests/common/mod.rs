#![allow(dead_code)]

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rivulet_rs::prelude::*;
use rivulet_rs::subscription;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Completed,
    Error(String),
}

/// Records everything it receives and lets the test wait for the
/// terminal signal with a bound.
#[derive(Debug)]
pub struct TestObserver<T> {
    values: Mutex<Vec<T>>,
    threads: Mutex<Vec<ThreadId>>,
    terminals: Mutex<Vec<Terminal>>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
}

impl<T: Clone + Send + 'static> TestObserver<T> {
    pub fn new() -> Arc<Self> {
        let (done_tx, done_rx) = bounded(1);
        Arc::new(Self {
            values: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            terminals: Mutex::new(Vec::new()),
            done_tx,
            done_rx,
        })
    }

    pub fn await_terminal(&self) {
        self.done_rx
            .recv_timeout(TIMEOUT)
            .expect("no terminal signal before timeout");
    }

    pub fn values(&self) -> Vec<T> {
        self.values.lock().clone()
    }

    /// Threads on which signals were delivered, in delivery order.
    pub fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().clone()
    }

    pub fn terminals(&self) -> Vec<Terminal> {
        self.terminals.lock().clone()
    }
}

impl<T> TestObserver<T> {
    fn terminate(&self, terminal: Terminal) {
        self.threads.lock().push(thread::current().id());
        self.terminals.lock().push(terminal);
        let _ = self.done_tx.try_send(());
    }
}

impl<T: Send> Observer<T> for TestObserver<T> {
    fn on_next(&self, value: T) {
        self.threads.lock().push(thread::current().id());
        self.values.lock().push(value);
    }

    fn on_error(&self, error: Error) {
        self.terminate(Terminal::Error(error.to_string()));
    }

    fn on_completed(&self) {
        self.terminate(Terminal::Completed);
    }
}

/// A cleanup resource that reports the thread it was released on.
pub fn thread_reporting_subscription() -> (SubscriptionRef, Receiver<ThreadId>) {
    let (tx, rx) = unbounded();
    let sub = subscription::from_fn(move || {
        let _ = tx.send(thread::current().id());
    });
    (sub, rx)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
