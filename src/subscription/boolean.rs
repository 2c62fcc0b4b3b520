use super::Subscription;
use crate::error::{Error, Result};
use crate::util::panic::run_contained;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// The basic token: one atomic flag and an optional cleanup action.
pub struct BooleanSubscription {
    unsubscribed: AtomicBool,
    // only the compare-exchange winner ever takes this
    action: Mutex<Option<Cleanup>>,
}

impl BooleanSubscription {
    pub fn new() -> Self {
        Self {
            unsubscribed: AtomicBool::new(false),
            action: Mutex::new(None),
        }
    }

    pub fn with_action<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            unsubscribed: AtomicBool::new(false),
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// Flips the flag without running the cleanup action. Returns `true`
    /// if this call performed the transition.
    pub(crate) fn mark_unsubscribed(&self) -> bool {
        let won = self
            .unsubscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.action.lock().take();
        }
        won
    }
}

impl Subscription for BooleanSubscription {
    fn unsubscribe(&self) -> Result<()> {
        if self
            .unsubscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        // guard is dropped before the action runs
        let action = self.action.lock().take();
        match action {
            Some(action) => run_contained(action).map_err(Error::CleanupPanicked),
            None => Ok(()),
        }
    }

    fn is_unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::Acquire)
    }
}

impl Default for BooleanSubscription {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BooleanSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BooleanSubscription")
            .field("unsubscribed", &self.is_unsubscribed())
            .finish()
    }
}
