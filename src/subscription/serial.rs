use super::{Subscription, SubscriptionRef};
use crate::error::Result;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Holds at most one child; replacing it cancels the previous one.
pub struct SerialSubscription {
    unsubscribed: AtomicBool,
    current: Mutex<Option<SubscriptionRef>>,
}

impl SerialSubscription {
    pub fn new() -> Self {
        Self {
            unsubscribed: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    /// Installs `next`, unsubscribing whatever it replaces. After this
    /// token is unsubscribed, `next` is unsubscribed immediately instead.
    pub fn set(&self, next: SubscriptionRef) -> Result<()> {
        let previous = {
            let mut current = self.current.lock();
            if self.unsubscribed.load(Ordering::Acquire) {
                None
            } else {
                Some(current.replace(next.clone()))
            }
        };

        match previous {
            // rejected: we are already unsubscribed
            None => next.unsubscribe(),
            Some(Some(old)) => old.unsubscribe(),
            Some(None) => Ok(()),
        }
    }

    pub fn get(&self) -> Option<SubscriptionRef> {
        self.current.lock().clone()
    }
}

impl Subscription for SerialSubscription {
    fn unsubscribe(&self) -> Result<()> {
        if self
            .unsubscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let current = self.current.lock().take();
        match current {
            Some(s) => s.unsubscribe(),
            None => Ok(()),
        }
    }

    fn is_unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::Acquire)
    }
}

impl Default for SerialSubscription {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SerialSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialSubscription")
            .field("unsubscribed", &self.is_unsubscribed())
            .field("has_current", &self.current.lock().is_some())
            .finish()
    }
}
