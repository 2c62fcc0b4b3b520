//! Panic containment for user-supplied actions.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Runs `f`, turning a panic into its message.
pub(crate) fn run_contained<F>(f: F) -> Result<(), String>
where
    F: FnOnce(),
{
    catch_unwind(AssertUnwindSafe(f)).map_err(payload_message)
}

pub(crate) fn payload_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
