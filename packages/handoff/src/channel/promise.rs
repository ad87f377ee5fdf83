// pluggable future constructor for the channel.
//
// the channel never implements a completion primitive itself. whenever a consumer has to wait, it
// asks the configured PromiseFactory for a linked (Waiter, future) pair, parks the Waiter in its
// pending consumers queue, and hands the future out. a producer later settles the Waiter.

use futures::future::{BoxFuture, FutureExt};


/// Sending half of a linked (waiter, future) pair
///
/// Implemented for the oneshot senders the crate ships factories for. Custom factories can
/// implement it for their own sender, or wrap a plain callback with [`Waiter::from_fn`].
pub trait Settle<V>: Send {
    /// Settle the linked future with `value`, or give it back as `Err` if nothing can ever observe
    /// it
    fn settle(self: Box<Self>, value: V) -> Result<(), V>;

    /// Whether the linked future has been dropped, so settling would fail
    ///
    /// The channel uses this to forget abandoned consumers. Defaults to `false`, in which case an
    /// abandoned consumer is only discovered once a producer tries to settle it.
    fn is_abandoned(&self) -> bool {
        false
    }
}

/// Settle handle backing a consumer future that is still waiting for its producer
///
/// Settling consumes the waiter, so it happens at most once. If the future the waiter drives has
/// already been dropped, settling fails and gives the value back.
pub struct Waiter<V>(Box<dyn Settle<V>>);

impl<V> Waiter<V> {
    /// Wrap a sender
    pub fn new<S>(sender: S) -> Self
    where
        S: Settle<V> + 'static,
    {
        Waiter(Box::new(sender))
    }

    /// Wrap a settle callback
    ///
    /// The callback must return the value back as `Err` if nothing can ever observe it. Such a
    /// waiter never reports itself abandoned.
    pub fn from_fn<F>(settle: F) -> Self
    where
        F: FnOnce(V) -> Result<(), V> + Send + 'static,
    {
        Waiter(Box::new(SettleFn(settle)))
    }

    /// Settle the linked future with `value`
    pub fn settle(self, value: V) -> Result<(), V> {
        self.0.settle(value)
    }

    /// Whether the linked future is known to have been dropped
    pub fn is_abandoned(&self) -> bool {
        self.0.is_abandoned()
    }
}

struct SettleFn<F>(F);

impl<V, F> Settle<V> for SettleFn<F>
where
    F: FnOnce(V) -> Result<(), V> + Send,
{
    fn settle(self: Box<Self>, value: V) -> Result<(), V> {
        (self.0)(value)
    }
}

/// Constructor for linked (waiter, future) pairs
///
/// The future resolves to `Some(value)` once the waiter is settled, or to `None` if the waiter is
/// dropped unsettled.
pub trait PromiseFactory<V>: Send + Sync + 'static {
    /// Create a new linked pair
    fn promise(&self) -> (Waiter<V>, BoxFuture<'static, Option<V>>);
}

impl<V, F> PromiseFactory<V> for F
where
    F: Fn() -> (Waiter<V>, BoxFuture<'static, Option<V>>) + Send + Sync + 'static,
{
    fn promise(&self) -> (Waiter<V>, BoxFuture<'static, Option<V>>) {
        self()
    }
}

/// Promises backed by [`tokio::sync::oneshot`]
///
/// This is the default when the `tokio` feature is enabled. It only needs tokio's `sync`
/// primitives, not a tokio runtime.
#[cfg(feature = "tokio")]
#[derive(Debug, Copy, Clone, Default)]
pub struct TokioOneshot;

#[cfg(feature = "tokio")]
impl<V: Send + 'static> PromiseFactory<V> for TokioOneshot {
    fn promise(&self) -> (Waiter<V>, BoxFuture<'static, Option<V>>) {
        let (send, recv) = tokio::sync::oneshot::channel();
        (Waiter::new(send), recv.map(Result::ok).boxed())
    }
}

#[cfg(feature = "tokio")]
impl<V: Send> Settle<V> for tokio::sync::oneshot::Sender<V> {
    fn settle(self: Box<Self>, value: V) -> Result<(), V> {
        (*self).send(value)
    }

    fn is_abandoned(&self) -> bool {
        self.is_closed()
    }
}

/// Promises backed by [`futures::channel::oneshot`]
#[derive(Debug, Copy, Clone, Default)]
pub struct FuturesOneshot;

impl<V: Send + 'static> PromiseFactory<V> for FuturesOneshot {
    fn promise(&self) -> (Waiter<V>, BoxFuture<'static, Option<V>>) {
        let (send, recv) = futures::channel::oneshot::channel();
        (Waiter::new(send), recv.map(Result::ok).boxed())
    }
}

impl<V: Send> Settle<V> for futures::channel::oneshot::Sender<V> {
    fn settle(self: Box<Self>, value: V) -> Result<(), V> {
        (*self).send(value)
    }

    fn is_abandoned(&self) -> bool {
        self.is_canceled()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn check_factory<P: PromiseFactory<u32>>(factory: P, reports_abandoned: bool) {
        // settled
        let (waiter, fut) = factory.promise();
        assert!(!waiter.is_abandoned());
        assert_eq!(waiter.settle(7), Ok(()));
        assert_eq!(fut.now_or_never(), Some(Some(7)));

        // dropped waiter
        let (waiter, fut) = factory.promise();
        drop(waiter);
        assert_eq!(fut.now_or_never(), Some(None));

        // dropped future hands the value back
        let (waiter, fut) = factory.promise();
        drop(fut);
        assert_eq!(waiter.is_abandoned(), reports_abandoned);
        assert_eq!(waiter.settle(9), Err(9));
    }

    #[cfg(feature = "tokio")]
    #[test]
    fn tokio_oneshot_factory() {
        check_factory(TokioOneshot, true);
    }

    #[test]
    fn futures_oneshot_factory() {
        check_factory(FuturesOneshot, true);
    }

    #[test]
    fn closure_factory() {
        check_factory(|| PromiseFactory::<u32>::promise(&FuturesOneshot), true);
    }

    #[test]
    fn callback_waiter_never_reports_abandoned() {
        check_factory(|| {
            let (send, recv) = futures::channel::oneshot::channel::<u32>();
            (Waiter::from_fn(move |value| send.send(value)), recv.map(Result::ok).boxed())
        }, false);
    }
}
