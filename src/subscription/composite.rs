use super::{same, unsubscribe_all, Subscription, SubscriptionRef};
use crate::error::Result;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// A token that owns a set of child tokens and cancels them together.
///
/// Once the composite is unsubscribed, every child it held and every child
/// added later is unsubscribed exactly once. A late `add` cancels the child
/// on the calling thread before returning.
pub struct CompositeSubscription {
    unsubscribed: AtomicBool,
    children: Mutex<Vec<SubscriptionRef>>,
}

impl CompositeSubscription {
    pub fn new() -> Self {
        Self {
            unsubscribed: AtomicBool::new(false),
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn from_children<I>(children: I) -> Self
    where
        I: IntoIterator<Item = SubscriptionRef>,
    {
        Self {
            unsubscribed: AtomicBool::new(false),
            children: Mutex::new(children.into_iter().collect()),
        }
    }

    /// Registers `child` for cascading cancellation.
    ///
    /// If the composite is already unsubscribed the child is unsubscribed
    /// instead, and its cleanup failure (if any) is returned.
    pub fn add(&self, child: SubscriptionRef) -> Result<()> {
        {
            let mut children = self.children.lock();
            // checked under the lock so a concurrent unsubscribe either
            // sees this child in its drain or we see its flag here
            if !self.unsubscribed.load(Ordering::Acquire) {
                children.push(child);
                return Ok(());
            }
        }
        child.unsubscribe()
    }

    /// Removes `child` and unsubscribes it. Unknown children are ignored.
    pub fn remove(&self, child: &SubscriptionRef) -> Result<()> {
        let removed = {
            let mut children = self.children.lock();
            children
                .iter()
                .position(|c| same(c, child))
                .map(|idx| children.swap_remove(idx))
        };
        match removed {
            Some(c) => c.unsubscribe(),
            None => Ok(()),
        }
    }

    /// Drops `child` from the set without unsubscribing it.
    pub(crate) fn forget(&self, child: &SubscriptionRef) {
        let mut children = self.children.lock();
        if let Some(idx) = children.iter().position(|c| same(c, child)) {
            children.swap_remove(idx);
        }
    }

    /// Unsubscribes and removes every child while leaving the composite
    /// itself usable.
    pub fn clear(&self) -> Result<()> {
        let drained = std::mem::take(&mut *self.children.lock());
        unsubscribe_all(drained)
    }

    pub fn len(&self) -> usize {
        self.children.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.lock().is_empty()
    }
}

impl Subscription for CompositeSubscription {
    fn unsubscribe(&self) -> Result<()> {
        if self
            .unsubscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let drained = std::mem::take(&mut *self.children.lock());
        unsubscribe_all(drained)
    }

    fn is_unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::Acquire)
    }
}

impl Default for CompositeSubscription {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompositeSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeSubscription")
            .field("unsubscribed", &self.is_unsubscribed())
            .field("children", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::subscription::{empty, from_fn};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    fn counting(count: &Arc<AtomicUsize>) -> SubscriptionRef {
        let c = count.clone();
        from_fn(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_unsubscribe_cascades() {
        let count = Arc::new(AtomicUsize::new(0));
        let composite = CompositeSubscription::new();
        for _ in 0..5 {
            composite.add(counting(&count)).unwrap();
        }

        composite.unsubscribe().unwrap();
        composite.unsubscribe().unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(composite.is_empty());
    }

    #[test]
    fn test_add_after_unsubscribe_is_synchronous() {
        let composite = CompositeSubscription::new();
        composite.unsubscribe().unwrap();

        let caller = thread::current().id();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let s = seen.clone();
        let child = from_fn(move || *s.lock() = Some(thread::current().id()));

        composite.add(child.clone()).unwrap();

        assert!(child.is_unsubscribed());
        assert_eq!(*seen.lock(), Some(caller));
        assert_eq!(composite.len(), 0);
    }

    #[test]
    fn test_failures_are_aggregated() {
        let composite = CompositeSubscription::new();
        composite.add(from_fn(|| panic!("socket"))).unwrap();
        composite.add(empty()).unwrap();
        composite.add(from_fn(|| panic!("file"))).unwrap();

        let err = composite.unsubscribe().unwrap_err();
        assert!(err.is_composite());

        let mut messages: Vec<String> = err
            .flatten()
            .into_iter()
            .map(|e| match e {
                Error::CleanupPanicked(m) => m,
                other => other.to_string(),
            })
            .collect();
        messages.sort();
        assert_eq!(messages, vec!["file", "socket"]);
    }

    #[test]
    fn test_remove_unsubscribes_child() {
        let composite = CompositeSubscription::new();
        let child = empty();
        let other = empty();
        composite.add(child.clone()).unwrap();
        composite.add(other.clone()).unwrap();

        composite.remove(&child).unwrap();

        assert!(child.is_unsubscribed());
        assert!(!other.is_unsubscribed());
        assert_eq!(composite.len(), 1);
    }

    #[test]
    fn test_clear_keeps_composite_open() {
        let count = Arc::new(AtomicUsize::new(0));
        let composite = CompositeSubscription::new();
        composite.add(counting(&count)).unwrap();
        composite.add(counting(&count)).unwrap();

        composite.clear().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!composite.is_unsubscribed());

        let late = empty();
        composite.add(late.clone()).unwrap();
        assert!(!late.is_unsubscribed());
    }

    #[test]
    fn test_concurrent_add_and_unsubscribe() {
        for _ in 0..50 {
            let count = Arc::new(AtomicUsize::new(0));
            let composite = Arc::new(CompositeSubscription::new());

            let adders: Vec<_> = (0..4)
                .map(|_| {
                    let composite = composite.clone();
                    let count = count.clone();
                    thread::spawn(move || {
                        for _ in 0..25 {
                            composite.add(counting(&count)).unwrap();
                        }
                    })
                })
                .collect();

            composite.unsubscribe().unwrap();
            for a in adders {
                a.join().unwrap();
            }

            assert_eq!(count.load(Ordering::SeqCst), 100);
        }
    }
}
