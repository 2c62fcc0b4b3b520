use crate::runtime;
use crate::scheduler::{self, SchedulerRef};
use crate::stream::{Observer, OnSubscribe, Stream, Subscriber};
use std::fmt;

/// Runs the upstream subscription on a worker instead of the caller.
///
/// The worker and the pending subscription action are both registered on
/// the subscriber, so unsubscribing before the action starts means the
/// producer never runs.
pub struct SubscribeOn<T> {
    source: Stream<T>,
    scheduler: SchedulerRef,
}

impl<T> SubscribeOn<T> {
    pub fn new(source: Stream<T>, scheduler: SchedulerRef) -> Self {
        Self { source, scheduler }
    }
}

impl<T: Send + 'static> OnSubscribe<T> for SubscribeOn<T> {
    fn call(&self, subscriber: Subscriber<T>) {
        let worker = match self.scheduler.create_worker() {
            Ok(worker) => worker,
            Err(e) => {
                subscriber.on_error(e);
                return;
            }
        };
        if let Err(e) = subscriber.add(scheduler::worker_subscription(&worker)) {
            runtime::report_error(e);
        }

        let source = self.source.clone();
        let inner = subscriber.clone();
        let token = worker.schedule(Box::new(move || {
            source.subscribe(inner);
        }));
        if let Err(e) = subscriber.add(token) {
            runtime::report_error(e);
        }
    }
}

impl<T> fmt::Debug for SubscribeOn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOn").finish_non_exhaustive()
    }
}
