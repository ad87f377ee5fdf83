// exposed API of channels

use self::future::*;
use super::{
    config::{Config, Policy},
    core::{self, CancelState},
    error::*,
};
use std::{
    any::Any,
    fmt::{self, Formatter, Debug},
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};


// ==== helper functions for adapting core API to exposed API ====


// best-effort message from a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(&msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "<non-string panic payload>"
    }
}


// ==== the exposed API ====


/// Handle to a channel
///
/// Producers hand values (or failures) in with [`publish`](Self::publish) and
/// [`reject`](Self::reject). Consumers ask for the next one with [`next`](Self::next), which
/// returns a future. Whichever side arrives first waits for the other: an early value is buffered,
/// an early consumer is parked. Pairing is FIFO in both directions.
///
/// Cloning a `Channel` creates another handle to the same channel. Dropping every handle without
/// cancelling drops all parked consumers, whose futures then resolve to
/// [`NextError::Cancelled`], but does not run the cancel hook.
pub struct Channel<T, E>(Arc<core::Core<T, E>>);

impl<T, E> Channel<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a channel
    pub fn new(config: Config<T, E>) -> Self {
        let channel = Channel(Arc::new(core::Core::new(config)));
        debug!(name = ?channel.name(), policy = ?channel.policy(), "created channel");
        channel
    }

    /// Publish a value
    ///
    /// If a consumer is waiting, the oldest one receives `value` immediately. Otherwise it is
    /// buffered for the next consumer. Does nothing once the channel has begun cancelling.
    pub fn publish(&self, value: T) {
        self.0.dispatch(Ok(value));
    }

    /// Publish a failure
    ///
    /// Delivered like [`publish`](Self::publish) delivers values, but the consumer receives
    /// [`NextError::Failed`]. Returns `self` for chaining.
    pub fn reject(&self, reason: E) -> &Self {
        self.0.dispatch(Err(NextError::Failed(reason)));
        self
    }

    /// Create a future for the next value
    ///
    /// If a value is buffered, the future is already resolved with the oldest one. Otherwise the
    /// future resolves when a producer arrives; under [`Policy::SharedFuture`], every call made
    /// before then receives a handle to the same future (see [`Next::ptr_eq`]).
    ///
    /// Errors synchronously if the channel has begun cancelling. Calling this then is a usage
    /// error, not a condition to recover from.
    pub fn next(&self) -> Result<Next<T, E>, AfterCancelError> {
        self.0.next().map(Next)
    }

    /// Cancel the channel
    ///
    /// 1. Producer and consumer calls stop taking effect immediately.
    /// 2. The configured cancel hook, if any, runs with this channel. If it fails or panics, that
    ///    is logged and cancellation continues.
    /// 3. Every parked consumer's future resolves to [`NextError::Cancelled`], in FIFO order, and
    ///    all buffered values are dropped.
    ///
    /// Only the first call does anything. Returns the state the channel is in afterwards, which is
    /// [`CancelState::Cancelling`] if another call is still cancelling.
    pub fn cancel(&self) -> CancelState {
        let hook = match self.0.begin_cancel() {
            Ok(hook) => hook,
            Err(state) => {
                trace!(name = ?self.name(), ?state, "ignoring repeated cancel");
                return state;
            }
        };
        debug!(name = ?self.name(), "cancelling channel");

        if let Some(hook) = hook {
            match catch_unwind(AssertUnwindSafe(|| hook(self))) {
                Ok(Ok(())) => (),
                Ok(Err(e)) => error!(name = ?self.name(), "cancel hook failed: {:#}", e),
                Err(payload) => error!(
                    name = ?self.name(),
                    "cancel hook panicked: {}",
                    panic_message(&*payload)
                ),
            }
        }

        self.0.finish_cancel()
    }

    /// Whether the channel has begun cancelling
    pub fn is_cancelled(&self) -> bool {
        self.cancel_state() != CancelState::Active
    }

    /// The channel's cancellation state
    pub fn cancel_state(&self) -> CancelState {
        self.0.state()
    }

    /// Number of values (and failures) buffered, waiting for a consumer
    pub fn buffered(&self) -> usize {
        self.0.buffered()
    }

    /// Number of consumers parked, waiting for a producer
    ///
    /// Only counts consumers whose future is still alive. Under [`Policy::SharedFuture`], all
    /// handles to one shared future count as one consumer.
    pub fn waiting(&self) -> usize {
        self.0.waiting()
    }

    /// The name the channel was configured with
    pub fn name(&self) -> Option<&str> {
        self.0.name()
    }

    /// The channel's queue-consumption policy
    pub fn policy(&self) -> Policy {
        self.0.policy()
    }
}

impl<T, E> Clone for Channel<T, E> {
    fn clone(&self) -> Self {
        Channel(Arc::clone(&self.0))
    }
}

impl<T, E> Default for Channel<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl<T, E> Debug for Channel<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name())
            .field("state", &self.cancel_state())
            .field("buffered", &self.buffered())
            .field("waiting", &self.waiting())
            .finish()
    }
}


// future types for channels.
pub(crate) mod future {
    use super::*;
    use std::{
        task::{Poll, Context},
        future::Future,
        pin::Pin,
    };

    /// Future for the next value of a [`Channel`]
    ///
    /// Resolves to the published value, to [`NextError::Failed`] with a published failure, or to
    /// [`NextError::Cancelled`] if the channel is cancelled (or dropped) first.
    ///
    /// Dropping an unresolved `Next` withdraws its consumer: it stops counting as
    /// [`waiting`](Channel::waiting), and producers never hand it a value. Under
    /// [`Policy::SharedFuture`] that only happens once every handle to the shared future is
    /// dropped.
    ///
    /// Once resolved, polling again returns `Poll::Pending`.
    pub struct Next<T, E>(pub(super) core::Recv<T, E>);

    // never pin-projected into.
    impl<T, E> Unpin for Next<T, E> {}

    impl<T, E> Future for Next<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        type Output = Outcome<T, E>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            self.get_mut().0.poll(cx)
        }
    }

    impl<T, E> Next<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Whether this and `other` are handles to the same shared future
        ///
        /// Only ever true under [`Policy::SharedFuture`], for unresolved handles.
        pub fn ptr_eq(&self, other: &Self) -> bool {
            self.0.ptr_eq(&other.0)
        }

        /// Whether this future has already resolved
        pub fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }
    }

    impl<T, E> futures::future::FusedFuture for Next<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }
}


// ==== tests ====
