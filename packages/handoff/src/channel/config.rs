// channel configuration.

use super::{
    api::Channel,
    error::Outcome,
    promise::PromiseFactory,
};
use futures::future::BoxFuture;
use std::{
    fmt::{self, Formatter, Debug},
    sync::Arc,
};


/// How consumer calls that find no buffered value are turned into futures
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Policy {
    /// Every consumer call made while a future is outstanding gets a handle to that same future,
    /// and they all observe the same outcome. The next call after it settles creates a new one.
    #[default]
    SharedFuture,
    /// Every consumer call gets its own future, settled strictly in call order.
    PerCall,
}

/// Hook run once when a channel is cancelled
///
/// An error it returns, or a panic, is logged and otherwise ignored: it can't stop the
/// cancellation.
pub type CancelHook<T, E> = Box<dyn FnOnce(&Channel<T, E>) -> anyhow::Result<()> + Send>;

/// Interceptor run each time the channel creates a waiter-backed future, which may return a
/// replacement for it
pub type Interceptor<T, E> = Arc<
    dyn Fn(BoxFuture<'static, Outcome<T, E>>) -> BoxFuture<'static, Outcome<T, E>> + Send + Sync
>;

/// Channel configuration
///
/// Starts from the defaults (see [`Config::new`]) and overrides them with the chaining methods.
/// Consumed when the channel is constructed, and never changes afterwards.
pub struct Config<T, E> {
    pub(crate) promise: Arc<dyn PromiseFactory<Outcome<T, E>>>,
    pub(crate) policy: Policy,
    pub(crate) on_cancel: Option<CancelHook<T, E>>,
    pub(crate) intercept: Option<Interceptor<T, E>>,
    pub(crate) name: Option<String>,
}

impl<T: Send + 'static, E: Send + 'static> Config<T, E> {
    /// Default configuration
    ///
    /// - promises from [`TokioOneshot`](crate::promise::TokioOneshot), or from
    ///   [`FuturesOneshot`](crate::promise::FuturesOneshot) without the `tokio` feature
    /// - [`Policy::SharedFuture`]
    /// - no cancel hook, no interceptor, no name
    pub fn new() -> Self {
        Config {
            promise: default_promise(),
            policy: Policy::default(),
            on_cancel: None,
            intercept: None,
            name: None,
        }
    }
}

#[cfg(feature = "tokio")]
fn default_promise<V: Send + 'static>() -> Arc<dyn PromiseFactory<V>> {
    Arc::new(super::promise::TokioOneshot)
}

#[cfg(not(feature = "tokio"))]
fn default_promise<V: Send + 'static>() -> Arc<dyn PromiseFactory<V>> {
    Arc::new(super::promise::FuturesOneshot)
}

impl<T, E> Config<T, E> {
    /// Set the queue-consumption policy
    pub fn set_policy(&mut self, policy: Policy) -> &mut Self {
        self.policy = policy;
        self
    }

    /// Ownership-chaining version of [`set_policy`](Self::set_policy)
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Use a different future constructor
    pub fn with_promise<P>(mut self, promise: P) -> Self
    where
        P: PromiseFactory<Outcome<T, E>>,
    {
        self.promise = Arc::new(promise);
        self
    }

    /// Run `hook` when the channel is cancelled
    ///
    /// The hook receives the channel, which is already in the
    /// [`Cancelling`](crate::CancelState::Cancelling) state, so producer and consumer calls it
    /// makes have no effect.
    pub fn on_cancel<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Channel<T, E>) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_cancel = Some(Box::new(hook));
        self
    }

    /// Pass every waiter-backed future the channel creates through `interceptor`
    ///
    /// Futures for already-buffered values are not intercepted. The interceptor is called after
    /// the consumer is parked and with the channel unlocked, so it may call back into the channel.
    pub fn intercept<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(BoxFuture<'static, Outcome<T, E>>) -> BoxFuture<'static, Outcome<T, E>>
            + Send + Sync + 'static,
    {
        self.intercept = Some(Arc::new(interceptor));
        self
    }

    /// Name the channel in log lines and errors
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The configured policy
    pub fn policy(&self) -> Policy {
        self.policy
    }
}

impl<T: Send + 'static, E: Send + 'static> Default for Config<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Debug for Config<T, E> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("policy", &self.policy)
            .field("on_cancel", &self.on_cancel.is_some())
            .field("intercept", &self.intercept.is_some())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
