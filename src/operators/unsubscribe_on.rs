use crate::runtime;
use crate::scheduler::SchedulerRef;
use crate::stream::{Operator, Subscriber};
use crate::subscription::{self, CompositeSubscription, Subscription};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Moves the producer's cleanup onto a worker.
///
/// The producer gets a subscriber over a private subscription set. The
/// downstream subscriber only holds a hook that, when triggered from any
/// thread, hands the release of that set to a fresh worker and returns.
pub struct UnsubscribeOn {
    scheduler: SchedulerRef,
}

impl UnsubscribeOn {
    pub fn new(scheduler: SchedulerRef) -> Self {
        Self { scheduler }
    }
}

impl fmt::Debug for UnsubscribeOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsubscribeOn").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Operator<T, T> for UnsubscribeOn {
    fn call(&self, downstream: Subscriber<T>) -> Subscriber<T> {
        let upstream = Arc::new(CompositeSubscription::new());

        let scheduler = self.scheduler.clone();
        let private = upstream.clone();
        let hook = subscription::from_fn(move || release_on(&scheduler, private));
        if let Err(e) = downstream.add(hook) {
            runtime::report_error(e);
        }

        Subscriber::with_subscriptions(downstream, upstream)
    }
}

fn release_on(scheduler: &SchedulerRef, subscriptions: Arc<CompositeSubscription>) {
    let worker = match scheduler.create_worker() {
        Ok(worker) => worker,
        Err(e) => {
            warn!(error = %e, "no worker for deferred cleanup, releasing inline");
            runtime::report_error(e);
            if let Err(e) = subscriptions.unsubscribe() {
                runtime::report_error(e);
            }
            return;
        }
    };

    let own = worker.clone();
    worker.schedule(Box::new(move || {
        if let Err(e) = subscriptions.unsubscribe() {
            runtime::report_error(e);
        }
        if let Err(e) = own.unsubscribe() {
            runtime::report_error(e);
        }
    }));
}
