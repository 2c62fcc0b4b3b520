pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Error, Result};
pub use crate::scheduler::{
    ComputationScheduler, ImmediateScheduler, NewThreadScheduler, Scheduler, SchedulerRef,
    SingleThreadScheduler, Worker, WorkerRef,
};
pub use crate::stream::{FnObserver, Observer, OnSubscribe, Operator, Stream, Subscriber};
pub use crate::subscription::{CompositeSubscription, Subscription, SubscriptionRef};
