//! Asynchronous rendezvous channel between producers and consumers.
//!
//! Producers [`publish`](Channel::publish) values or [`reject`](Channel::reject) with failures.
//! Consumers ask for the [`next`](Channel::next) one and get a future. Neither side ever blocks:
//! whichever arrives first is queued until the other side shows up, and pairing is FIFO in both
//! directions.
//!
//! ```
//! use handoff::{Channel, error::NextError};
//! use futures::executor::block_on;
//!
//! let ch = Channel::<u32, &str>::default();
//! ch.publish(1);
//! assert_eq!(block_on(ch.next().unwrap()), Ok(1));
//!
//! let pending = ch.next().unwrap();
//! ch.reject("boom");
//! assert_eq!(block_on(pending), Err(NextError::Failed("boom")));
//! ```
//!
//! Consumers that call `next` while no value is buffered either share one future (the default,
//! [`Policy::SharedFuture`]) or each get their own ([`Policy::PerCall`]).
//!
//! [`cancel`](Channel::cancel) tears the channel down: it runs an optional hook, rejects every
//! waiting consumer with [`NextError::Cancelled`](error::NextError::Cancelled), and turns further
//! calls into no-ops (producers) or errors (consumers).

#[macro_use]
extern crate tracing;

mod channel;

pub use crate::channel::{
    api::*,
    config::{CancelHook, Config, Interceptor, Policy},
    core::CancelState,
};

/// Error types
pub mod error {
    pub use crate::channel::error::*;
}

/// Future types
pub mod future {
    pub use crate::channel::api::future::*;
}

/// Pluggable future constructors
pub mod promise {
    pub use crate::channel::promise::*;
}
