//! Rivulet - scheduling and subscription lifecycle for push-based streams
//!
//! A [`Stream`](stream::Stream) is an inert description of a computation
//! that pushes values to a subscriber. This crate provides the pieces that
//! decide *where* each phase of a subscription runs and *how* it is torn
//! down:
//!
//! - [`subscription`]: idempotent cancellation tokens and composites.
//! - [`scheduler`]: serial workers backed by event-loop threads, a
//!   dedicated single thread, a thread per worker, or the caller itself.
//! - [`operators`]: `subscribe_on`, `observe_on` and `unsubscribe_on`,
//!   which move production, delivery and cleanup onto chosen schedulers.
//!
//! # Quick Start
//!
//! ```no_run
//! use rivulet_rs::prelude::*;
//! use std::sync::Arc;
//!
//! let io = Arc::new(SingleThreadScheduler::new().unwrap());
//! let computation = rivulet_rs::runtime::computation().unwrap();
//!
//! let stream = Stream::create(|subscriber: Subscriber<i32>| {
//!     subscriber
//!         .add(rivulet_rs::subscription::from_fn(|| println!("released")))
//!         .unwrap();
//!     subscriber.on_next(1);
//!     subscriber.on_next(2);
//!     subscriber.on_completed();
//! });
//!
//! stream
//!     .subscribe_on(io.clone())
//!     .observe_on(computation)
//!     .unsubscribe_on(io)
//!     .subscribe_observer(FnObserver::new(|x: i32| println!("got {}", x)));
//! ```

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod operators;
pub mod prelude;
pub mod runtime;
pub mod scheduler;
pub mod stream;
pub mod subscription;

pub(crate) mod util;

pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use runtime::init_with_config;
