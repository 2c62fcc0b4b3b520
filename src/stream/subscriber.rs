use super::observer::Observer;
use crate::error::{Error, Result};
use crate::runtime;
use crate::subscription::{CompositeSubscription, Subscription, SubscriptionRef};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle of a [`Subscriber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Active,
    /// A terminal signal was accepted; resources may still be held.
    Terminated,
    Unsubscribed,
}

struct Inner<T> {
    observer: Box<dyn Observer<T>>,
    subscriptions: Arc<CompositeSubscription>,
    terminated: AtomicBool,
    release_on_terminal: bool,
}

/// The sink handed to a producer.
///
/// A subscriber forwards signals to its observer while enforcing the
/// stream contract: nothing after unsubscription, no value after a terminal
/// signal, and at most one terminal signal. It is also the cancellation
/// token for everything registered through [`add`](Subscriber::add).
///
/// Cloning yields another handle to the same subscriber.
pub struct Subscriber<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Subscriber<T> {
    /// A consumer-facing subscriber with its own subscriptions. It releases
    /// them as soon as it has delivered a terminal signal.
    pub fn new<O>(observer: O) -> Self
    where
        O: Observer<T> + 'static,
    {
        Self::build(observer, Arc::new(CompositeSubscription::new()), true)
    }

    /// A subscriber that shares `downstream`'s subscriptions, so cancelling
    /// either cancels both. Used by operators sitting between a producer and
    /// the next stage; it does not release anything on its own.
    pub fn sharing<U, O>(observer: O, downstream: &Subscriber<U>) -> Self
    where
        O: Observer<T> + 'static,
    {
        Self::build(observer, downstream.inner.subscriptions.clone(), false)
    }

    /// A subscriber over an explicitly supplied subscription set. It does
    /// not release anything on its own.
    pub fn with_subscriptions<O>(observer: O, subscriptions: Arc<CompositeSubscription>) -> Self
    where
        O: Observer<T> + 'static,
    {
        Self::build(observer, subscriptions, false)
    }

    fn build<O>(observer: O, subscriptions: Arc<CompositeSubscription>, release_on_terminal: bool) -> Self
    where
        O: Observer<T> + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                observer: Box::new(observer),
                subscriptions,
                terminated: AtomicBool::new(false),
                release_on_terminal,
            }),
        }
    }
}

impl<T> Subscriber<T> {
    /// Registers a resource to be released when this subscriber is
    /// unsubscribed. If it already is, the resource is released now.
    pub fn add(&self, subscription: SubscriptionRef) -> Result<()> {
        self.inner.subscriptions.add(subscription)
    }

    pub fn subscriptions(&self) -> &Arc<CompositeSubscription> {
        &self.inner.subscriptions
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SubscriberState {
        if self.inner.subscriptions.is_unsubscribed() {
            SubscriberState::Unsubscribed
        } else if self.is_terminated() {
            SubscriberState::Terminated
        } else {
            SubscriberState::Active
        }
    }

    fn try_terminate(&self) -> bool {
        self.inner
            .terminated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        if !self.inner.release_on_terminal {
            return;
        }
        if let Err(e) = self.inner.subscriptions.unsubscribe() {
            runtime::report_error(e);
        }
    }
}

impl<T: Send + 'static> Subscriber<T> {
    /// This subscriber as a plain cancellation token.
    pub fn as_subscription(&self) -> SubscriptionRef {
        Arc::new(self.clone())
    }
}

impl<T> Observer<T> for Subscriber<T> {
    fn on_next(&self, value: T) {
        if self.is_terminated() || self.inner.subscriptions.is_unsubscribed() {
            return;
        }
        self.inner.observer.on_next(value);
    }

    fn on_error(&self, error: Error) {
        if !self.try_terminate() {
            return;
        }
        if !self.inner.subscriptions.is_unsubscribed() {
            self.inner.observer.on_error(error);
        }
        self.release();
    }

    fn on_completed(&self) {
        if !self.try_terminate() {
            return;
        }
        if !self.inner.subscriptions.is_unsubscribed() {
            self.inner.observer.on_completed();
        }
        self.release();
    }
}

impl<T> Subscription for Subscriber<T> {
    fn unsubscribe(&self) -> Result<()> {
        self.inner.subscriptions.unsubscribe()
    }

    fn is_unsubscribed(&self) -> bool {
        self.inner.subscriptions.is_unsubscribed()
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("state", &self.state())
            .field("subscriptions", &self.inner.subscriptions.len())
            .finish()
    }
}
