//! Per-loop counters.

use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by every event loop.
#[derive(Debug, Default)]
pub struct EventLoopMetrics {
    scheduled: AtomicU64,
    executed: AtomicU64,
    cancelled: AtomicU64,
    panicked: AtomicU64,
    rejected: AtomicU64,
}

impl EventLoopMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EventLoopMetricsSnapshot {
        EventLoopMetricsSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EventLoopMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventLoopMetricsSnapshot {
    /// Actions accepted into the queue
    pub scheduled: u64,
    /// Actions that ran to completion
    pub executed: u64,
    /// Actions dequeued after their token was unsubscribed
    pub cancelled: u64,
    /// Actions that panicked while running
    pub panicked: u64,
    /// Actions refused because the loop was shut down
    pub rejected: u64,
}

impl EventLoopMetricsSnapshot {
    /// Accepted actions that have not been dequeued yet.
    pub fn pending(&self) -> u64 {
        self.scheduled
            .saturating_sub(self.executed + self.cancelled + self.panicked)
    }
}

impl Add for EventLoopMetricsSnapshot {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            scheduled: self.scheduled + rhs.scheduled,
            executed: self.executed + rhs.executed,
            cancelled: self.cancelled + rhs.cancelled,
            panicked: self.panicked + rhs.panicked,
            rejected: self.rejected + rhs.rejected,
        }
    }
}
