//! Process-wide defaults.
//!
//! The computation scheduler is created on first use (or by an explicit
//! [`init_with_config`]) and lives for the rest of the process; nothing
//! tears it down. Operators never reach for it implicitly: callers pass it
//! in like any other scheduler.
//!
//! Errors raised where no subscriber can receive them (cleanup run on a
//! scheduler thread, panics inside scheduled actions) are funnelled through
//! [`report_error`].

use crate::config::Config;
use crate::error::{Error, Result};
use crate::scheduler::{ComputationScheduler, ImmediateScheduler, NewThreadScheduler, SchedulerRef};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::error;

type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

static COMPUTATION: RwLock<Option<Arc<ComputationScheduler>>> = RwLock::new(None);
static ERROR_HANDLER: RwLock<Option<ErrorHandler>> = RwLock::new(None);

/// Creates the process-wide computation scheduler with `config`.
///
/// Fails with [`Error::AlreadyInitialized`] once the scheduler exists,
/// including when an earlier [`computation`] call created it with defaults.
pub fn init_with_config(config: Config) -> Result<()> {
    let mut slot = COMPUTATION.write();
    if slot.is_some() {
        return Err(Error::AlreadyInitialized);
    }
    *slot = Some(Arc::new(ComputationScheduler::new(&config)?));
    Ok(())
}

/// The process-wide computation scheduler, created with the default
/// [`Config`] on first use.
pub fn computation() -> Result<Arc<ComputationScheduler>> {
    if let Some(scheduler) = COMPUTATION.read().as_ref() {
        return Ok(scheduler.clone());
    }

    let mut slot = COMPUTATION.write();
    // another thread may have won the race for the write lock
    if let Some(scheduler) = slot.as_ref() {
        return Ok(scheduler.clone());
    }
    let scheduler = Arc::new(ComputationScheduler::new(&Config::default())?);
    *slot = Some(scheduler.clone());
    Ok(scheduler)
}

/// A scheduler that spawns a dedicated thread per worker.
pub fn new_thread() -> SchedulerRef {
    Arc::new(NewThreadScheduler::new())
}

/// A scheduler that runs actions inline on the calling thread.
pub fn immediate() -> SchedulerRef {
    Arc::new(ImmediateScheduler::new())
}

/// Installs the hook that receives errors which have no subscriber to go
/// to. Replaces any previous hook.
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&Error) + Send + Sync + 'static,
{
    *ERROR_HANDLER.write() = Some(Arc::new(handler));
}

pub fn clear_error_handler() {
    *ERROR_HANDLER.write() = None;
}

/// Logs `error` and forwards it to the installed hook, if any.
pub fn report_error(error: Error) {
    error!(%error, "unhandled error");
    let handler = ERROR_HANDLER.read().clone();
    if let Some(handler) = handler {
        handler(&error);
    }
}
