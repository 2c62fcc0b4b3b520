//! Push-based streams.
//!
//! A [`Stream`] is a recipe: nothing happens until it is subscribed. Each
//! call to [`Stream::subscribe`] runs the production callback once, on the
//! calling thread, with a fresh [`Subscriber`]. Operators that move work to
//! other threads ([`Stream::subscribe_on`], [`Stream::observe_on`],
//! [`Stream::unsubscribe_on`]) wrap the callback rather than changing this
//! rule.

pub mod observer;
pub mod subscriber;

pub use observer::{FnObserver, Observer};
pub use subscriber::{Subscriber, SubscriberState};

use crate::error::Error;
use crate::operators::{ObserveOn, SubscribeOn, UnsubscribeOn};
use crate::scheduler::SchedulerRef;
use crate::subscription::{Subscription, SubscriptionRef};
use crate::util::panic::run_contained;
use std::fmt;
use std::sync::Arc;

/// The production callback behind a stream.
pub trait OnSubscribe<T>: Send + Sync {
    fn call(&self, subscriber: Subscriber<T>);
}

impl<T, F> OnSubscribe<T> for F
where
    F: Fn(Subscriber<T>) + Send + Sync,
{
    fn call(&self, subscriber: Subscriber<T>) {
        self(subscriber)
    }
}

/// Turns the subscriber of a downstream stage into the subscriber handed
/// to the upstream producer.
pub trait Operator<R, T>: Send + Sync {
    fn call(&self, downstream: Subscriber<R>) -> Subscriber<T>;
}

pub struct Stream<T> {
    on_subscribe: Arc<dyn OnSubscribe<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            on_subscribe: self.on_subscribe.clone(),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Stream<T> {
    /// A stream whose subscribers are fed by `f`.
    pub fn create<F>(f: F) -> Self
    where
        F: Fn(Subscriber<T>) + Send + Sync + 'static,
    {
        Self {
            on_subscribe: Arc::new(f),
        }
    }

    pub fn from_on_subscribe(on_subscribe: Arc<dyn OnSubscribe<T>>) -> Self {
        Self { on_subscribe }
    }

    /// Emits every item of `items`, then completes. Stops early once the
    /// subscriber is unsubscribed.
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    {
        Self::create(move |subscriber: Subscriber<T>| {
            for item in items.clone() {
                if subscriber.is_unsubscribed() {
                    return;
                }
                subscriber.on_next(item);
            }
            subscriber.on_completed();
        })
    }

    /// Runs the production callback on the calling thread and returns the
    /// subscriber as the cancellation handle.
    ///
    /// A panic in the callback is delivered to the subscriber as an error.
    pub fn subscribe(&self, subscriber: Subscriber<T>) -> SubscriptionRef {
        let handle = subscriber.as_subscription();
        let sink = subscriber.clone();
        if let Err(message) = run_contained(|| self.on_subscribe.call(subscriber)) {
            sink.on_error(Error::stream(format!("producer panicked: {}", message)));
        }
        handle
    }

    /// Wraps `observer` in a consumer-facing subscriber and subscribes it.
    pub fn subscribe_observer<O>(&self, observer: O) -> Subscriber<T>
    where
        O: Observer<T> + 'static,
    {
        let subscriber = Subscriber::new(observer);
        self.subscribe(subscriber.clone());
        subscriber
    }

    /// A stream that passes every subscriber through `operator` before it
    /// reaches this stream's producer.
    pub fn lift<R, Op>(&self, operator: Op) -> Stream<R>
    where
        R: Send + 'static,
        Op: Operator<R, T> + 'static,
    {
        let source = self.clone();
        Stream::create(move |downstream: Subscriber<R>| {
            let upstream = operator.call(downstream);
            source.subscribe(upstream);
        })
    }

    /// Subscribes to this stream on a worker from `scheduler`. The
    /// returned stream's `subscribe` returns without waiting for production
    /// to begin.
    pub fn subscribe_on(&self, scheduler: SchedulerRef) -> Stream<T> {
        Stream::from_on_subscribe(Arc::new(SubscribeOn::new(self.clone(), scheduler)))
    }

    /// Delivers signals to subscribers on a worker from `scheduler`, in
    /// the order they were produced.
    pub fn observe_on(&self, scheduler: SchedulerRef) -> Stream<T> {
        self.lift(ObserveOn::new(scheduler))
    }

    /// Runs the producer's cleanup on a worker from `scheduler` instead of
    /// on the thread that unsubscribes.
    pub fn unsubscribe_on(&self, scheduler: SchedulerRef) -> Stream<T> {
        self.lift(UnsubscribeOn::new(scheduler))
    }
}
