//! Cancellation tokens.
//!
//! A [`Subscription`] is the handle through which any party cancels work
//! or releases a resource. Every implementation here guarantees that the
//! cleanup bound to a token runs at most once, and exactly once if
//! `unsubscribe` is ever called, no matter how many threads race on it.
//!
//! The unsubscribed transition is always a compare-exchange on an atomic
//! flag. No lock is held while cleanup code runs, so a cleanup action may
//! freely unsubscribe other tokens, including the one that owns it.

pub mod boolean;
pub mod composite;
pub mod serial;

pub use boolean::BooleanSubscription;
pub use composite::CompositeSubscription;
pub use serial::SerialSubscription;

use crate::error::{Error, Result};
use std::sync::Arc;

/// A cancellation token with idempotent, at-most-once cleanup.
pub trait Subscription: Send + Sync {
    /// Cancels the token. Only the first call runs cleanup; its failure,
    /// if any, is returned to that caller. Later calls return `Ok(())`.
    fn unsubscribe(&self) -> Result<()>;

    fn is_unsubscribed(&self) -> bool;
}

pub type SubscriptionRef = Arc<dyn Subscription>;

impl<S: Subscription + ?Sized> Subscription for Arc<S> {
    fn unsubscribe(&self) -> Result<()> {
        (**self).unsubscribe()
    }

    fn is_unsubscribed(&self) -> bool {
        (**self).is_unsubscribed()
    }
}

/// A token with no cleanup action.
pub fn empty() -> SubscriptionRef {
    Arc::new(BooleanSubscription::new())
}

/// A token that is already in the unsubscribed state.
pub fn unsubscribed() -> SubscriptionRef {
    let s = BooleanSubscription::new();
    s.mark_unsubscribed();
    Arc::new(s)
}

/// A token that runs `action` on first unsubscribe.
pub fn from_fn<F>(action: F) -> SubscriptionRef
where
    F: FnOnce() + Send + 'static,
{
    Arc::new(BooleanSubscription::with_action(action))
}

/// Identity comparison that ignores vtable pointers.
pub(crate) fn same(a: &SubscriptionRef, b: &SubscriptionRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Unsubscribes every token, collecting failures instead of stopping at
/// the first one.
pub(crate) fn unsubscribe_all<I>(subscriptions: I) -> Result<()>
where
    I: IntoIterator<Item = SubscriptionRef>,
{
    let errors: Vec<Error> = subscriptions
        .into_iter()
        .filter_map(|s| s.unsubscribe().err())
        .collect();
    Error::aggregate(errors)
}
