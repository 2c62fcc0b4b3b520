use crate::error::Error;
use std::fmt;
use std::sync::Arc;

/// Receiver of stream signals: any number of values, then at most one
/// terminal signal.
pub trait Observer<T>: Send + Sync {
    fn on_next(&self, value: T);
    fn on_error(&self, error: Error);
    fn on_completed(&self);
}

impl<T, O: Observer<T> + ?Sized> Observer<T> for Arc<O> {
    fn on_next(&self, value: T) {
        (**self).on_next(value)
    }

    fn on_error(&self, error: Error) {
        (**self).on_error(error)
    }

    fn on_completed(&self) {
        (**self).on_completed()
    }
}

type NextFn<T> = Box<dyn Fn(T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(Error) + Send + Sync>;
type CompletedFn = Box<dyn Fn() + Send + Sync>;

/// Closure-backed observer. Unset callbacks ignore their signal.
pub struct FnObserver<T> {
    next: NextFn<T>,
    error: Option<ErrorFn>,
    completed: Option<CompletedFn>,
}

impl<T> FnObserver<T> {
    pub fn new<F>(next: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            next: Box::new(next),
            error: None,
            completed: None,
        }
    }

    pub fn with_error<F>(mut self, f: F) -> Self
    where
        F: Fn(Error) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }

    pub fn with_completed<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.completed = Some(Box::new(f));
        self
    }
}

impl<T> Observer<T> for FnObserver<T> {
    fn on_next(&self, value: T) {
        (self.next)(value)
    }

    fn on_error(&self, error: Error) {
        match &self.error {
            Some(f) => f(error),
            None => tracing::debug!(%error, "error signal without handler"),
        }
    }

    fn on_completed(&self) {
        if let Some(f) = &self.completed {
            f()
        }
    }
}

impl<T> fmt::Debug for FnObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver")
            .field("has_error", &self.error.is_some())
            .field("has_completed", &self.completed.is_some())
            .finish()
    }
}
