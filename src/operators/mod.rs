//! Thread-boundary operators.
//!
//! Each one relocates a single phase of a subscription onto a worker:
//!
//! - [`SubscribeOn`]: the producer's run.
//! - [`ObserveOn`]: delivery of signals to the consumer.
//! - [`UnsubscribeOn`]: the producer's cleanup.
//!
//! The three are independent, so a pipeline may send each phase to a
//! different scheduler. They are reached through the methods of the same
//! name on [`Stream`](crate::stream::Stream).

pub mod observe_on;
pub mod subscribe_on;
pub mod unsubscribe_on;

pub use observe_on::ObserveOn;
pub use subscribe_on::SubscribeOn;
pub use unsubscribe_on::UnsubscribeOn;
