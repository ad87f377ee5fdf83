// dispatch engine and cancellation state machine. the exposed API is a thin wrapper around this.

use super::{
    config::{Config, CancelHook, Interceptor, Policy},
    error::{AfterCancelError, CancelledError, Outcome},
    promise::{PromiseFactory, Waiter},
};
use futures::{
    future::{self, BoxFuture, FutureExt, Shared, WeakShared},
    ready,
};
use std::{
    collections::VecDeque,
    mem::take,
    sync::{
        atomic::{
            Ordering::{AcqRel, Acquire, Release},
            AtomicU8,
        },
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    task::{Context, Poll},
};


// future shared between all consumers under Policy::SharedFuture.
pub(crate) type SharedNext<T, E> = Shared<BoxFuture<'static, Outcome<T, E>>>;

// channel shared state.
pub(crate) struct Core<T, E> {
    // mutex around lockable state.
    lockable: Mutex<Lockable<T, E>>,

    // begins as CancelState::Active.
    //
    // - only ever moves forward: Active -> Cancelling -> Cancelled.
    // - while not Active, publish and next have no effect on lockable.
    // - once Cancelled, both queues and the shared slot are empty forever.
    state: AtomicU8,

    // the rest is configuration, immutable after construction.
    promise: Arc<dyn PromiseFactory<Outcome<T, E>>>,
    policy: Policy,
    intercept: Option<Interceptor<T, E>>,
    name: Option<String>,
}

// channel lockable state.
//
// invariant: values and consumers are never both non-empty.
struct Lockable<T, E> {
    // buffered outcomes that no consumer has asked for yet.
    values: VecDeque<Outcome<T, E>>,
    // parked consumers that no producer has settled yet.
    consumers: VecDeque<Parked<T, E>>,
    // the outstanding shared future, if any. weak so that it dies with its last consumer handle.
    shared: Option<SharedSlot<T, E>>,
    // generation to give the next shared future.
    next_generation: u64,
    // taken exactly once, by whichever cancel call wins the transition out of Active.
    on_cancel: Option<CancelHook<T, E>>,
}

// waiter parked in the consumer queue.
struct Parked<T, E> {
    waiter: Waiter<Outcome<T, E>>,
    // generation of the shared future this waiter drives, if it drives one.
    generation: Option<u64>,
}

// weak reference to the outstanding shared future.
struct SharedSlot<T, E> {
    generation: u64,
    fut: WeakShared<BoxFuture<'static, Outcome<T, E>>>,
}

/// Cancellation state of a channel
///
/// Moves only forward, from `Active` to `Cancelling` to `Cancelled`.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum CancelState {
    /// Producer and consumer calls take effect.
    Active,
    /// Cancellation has begun and its cleanup is running. Producer and consumer calls no longer
    /// take effect.
    Cancelling,
    /// Cancellation is complete. Terminal.
    Cancelled,
}

impl CancelState {
    // convert state byte into typed representation.
    fn from_byte(byte: u8) -> Self {
        if byte == CancelState::Active as u8 {
            CancelState::Active
        } else if byte == CancelState::Cancelling as u8 {
            CancelState::Cancelling
        } else if byte == CancelState::Cancelled as u8 {
            CancelState::Cancelled
        } else {
            unreachable!("invalid cancel state byte: {}", byte)
        }
    }
}

// state of a consumer future.
pub(crate) enum Recv<T, E> {
    // a buffered outcome was available when the consumer asked.
    Ready(future::Ready<Outcome<T, E>>),
    // this consumer has its own waiter.
    Waiting(BoxFuture<'static, Outcome<T, E>>),
    // this consumer shares a waiter with others.
    Shared(SharedNext<T, E>),
    // already resolved.
    Done,
}

impl<T, E> Recv<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    // poll the future. once resolved, stays pending forever.
    pub(crate) fn poll(&mut self, cx: &mut Context) -> Poll<Outcome<T, E>> {
        let outcome = match self {
            Recv::Ready(fut) => ready!(fut.poll_unpin(cx)),
            Recv::Waiting(fut) => ready!(fut.poll_unpin(cx)),
            Recv::Shared(fut) => ready!(fut.poll_unpin(cx)),
            Recv::Done => return Poll::Pending,
        };
        *self = Recv::Done;
        Poll::Ready(outcome)
    }

    // whether shares its waiter with another.
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Recv::Shared(a), Recv::Shared(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub(crate) fn is_terminated(&self) -> bool {
        matches!(self, Recv::Done)
    }
}

impl<T, E> Core<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    // construct active and empty.
    pub(crate) fn new(config: Config<T, E>) -> Self {
        let Config { promise, policy, on_cancel, intercept, name } = config;
        Core {
            lockable: Mutex::new(Lockable {
                values: VecDeque::new(),
                consumers: VecDeque::new(),
                shared: None,
                next_generation: 0,
                on_cancel,
            }),
            state: AtomicU8::new(CancelState::Active as u8),
            promise,
            policy,
            intercept,
            name,
        }
    }

    // lock the channel. every mutation completes before user code runs under the lock, so a
    // poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Lockable<T, E>> {
        self.lockable.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // atomic-read the cancel state.
    pub(crate) fn state(&self) -> CancelState {
        CancelState::from_byte(self.state.load(Acquire))
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn policy(&self) -> Policy {
        self.policy
    }

    // number of buffered outcomes.
    pub(crate) fn buffered(&self) -> usize {
        self.lock().values.len()
    }

    // number of parked waiters whose future is still alive.
    pub(crate) fn waiting(&self) -> usize {
        self.lock().consumers.iter().filter(|parked| !parked.waiter.is_abandoned()).count()
    }

    // whether a producer call should take effect, logging why not otherwise.
    fn accepts_producers(&self) -> bool {
        match self.state() {
            CancelState::Active => true,
            CancelState::Cancelling => {
                trace!(name = ?self.name(), "ignoring producer call while cancelling");
                false
            }
            CancelState::Cancelled => {
                warn!(name = ?self.name(), "producer call received after cancellation");
                false
            }
        }
    }

    // err unless active.
    fn check_active(&self) -> Result<(), AfterCancelError> {
        match self.state() {
            CancelState::Active => Ok(()),
            state => Err(AfterCancelError { name: self.name.clone(), state }),
        }
    }

    // hand an outcome to the oldest parked consumer, or buffer it if there is none.
    //
    // no-op unless active.
    pub(crate) fn dispatch(&self, mut outcome: Outcome<T, E>) {
        if !self.accepts_producers() {
            return;
        }
        let mut lock = self.lock();
        // now that channel is locked, cancellation can't start draining under us
        if !self.accepts_producers() {
            return;
        }

        while let Some(parked) = lock.consumers.pop_front() {
            if let Some(generation) = parked.generation {
                // the shared future is about to settle, later consumers need a new one
                if lock.shared.as_ref().is_some_and(|slot| slot.generation == generation) {
                    lock.shared = None;
                }
            }
            match parked.waiter.settle(outcome) {
                Ok(()) => {
                    trace!(name = ?self.name(), "handed outcome to waiting consumer");
                    return;
                }
                Err(returned) => {
                    // consumer dropped its future
                    trace!(name = ?self.name(), "skipping abandoned consumer");
                    outcome = returned;
                }
            }
        }

        lock.values.push_back(outcome);
        trace!(name = ?self.name(), buffered = lock.values.len(), "buffered outcome");
    }

    // take the oldest buffered outcome, or else park a consumer according to the policy.
    pub(crate) fn next(self: &Arc<Self>) -> Result<Recv<T, E>, AfterCancelError> {
        self.check_active()?;
        let mut lock = self.lock();
        self.check_active()?;

        if let Some(outcome) = lock.values.pop_front() {
            debug_assert!(lock.consumers.is_empty());
            trace!(name = ?self.name(), "took buffered outcome");
            return Ok(Recv::Ready(future::ready(outcome)));
        }

        match self.policy {
            Policy::PerCall => {
                let fut = self.park(&mut lock, None);
                drop(lock);
                Ok(Recv::Waiting(self.intercept(fut)))
            }
            Policy::SharedFuture => {
                if let Some(fut) = lock.shared.as_ref().and_then(|slot| slot.fut.upgrade()) {
                    trace!(name = ?self.name(), "joining outstanding shared future");
                    return Ok(Recv::Shared(fut));
                }

                let generation = lock.next_generation;
                lock.next_generation += 1;
                let fut = self.park(&mut lock, Some(generation));
                drop(lock);

                // if something other than a producer settles it (such as an interceptor's
                // timeout), clear the slot once it does
                let core = Arc::downgrade(self);
                let fut = self.intercept(fut);
                let fut = async move {
                    let outcome = fut.await;
                    if let Some(core) = core.upgrade() {
                        core.clear_shared(generation);
                    }
                    outcome
                };
                let fut = fut.boxed().shared();

                // the interceptor ran unlocked, so a producer or cancellation may have reached our
                // waiter meanwhile. only install the slot while it is still parked.
                let mut lock = self.lock();
                let parked = lock.consumers.iter().any(|p| p.generation == Some(generation));
                let occupied = lock.shared.as_ref()
                    .is_some_and(|slot| slot.fut.upgrade().is_some());
                if parked && !occupied {
                    lock.shared = fut.downgrade().map(|fut| SharedSlot { generation, fut });
                }
                Ok(Recv::Shared(fut))
            }
        }
    }

    // forget waiters whose future was dropped, then create a promise, park its waiter, and return
    // its future.
    fn park(
        &self,
        lock: &mut Lockable<T, E>,
        generation: Option<u64>,
    ) -> BoxFuture<'static, Outcome<T, E>> {
        let before = lock.consumers.len();
        lock.consumers.retain(|parked| !parked.waiter.is_abandoned());
        if lock.consumers.len() < before {
            let pruned = before - lock.consumers.len();
            trace!(name = ?self.name(), pruned, "forgot abandoned consumers");
        }

        let (waiter, fut) = self.promise.promise();
        lock.consumers.push_back(Parked { waiter, generation });
        trace!(name = ?self.name(), waiting = lock.consumers.len(), "parked consumer");

        // a waiter dropped unsettled means the channel itself was dropped
        fut.map(|settled| settled.unwrap_or(Err(CancelledError.into()))).boxed()
    }

    // pass a waiter-backed future through the interceptor, if any. must be called unlocked.
    fn intercept(
        &self,
        fut: BoxFuture<'static, Outcome<T, E>>,
    ) -> BoxFuture<'static, Outcome<T, E>> {
        match &self.intercept {
            Some(intercept) => intercept(fut),
            None => fut,
        }
    }

    // clear the shared slot if it still holds the given generation.
    fn clear_shared(&self, generation: u64) {
        let mut lock = self.lock();
        if lock.shared.as_ref().is_some_and(|slot| slot.generation == generation) {
            lock.shared = None;
        }
    }

    // begin cancelling.
    //
    // if this call moved the channel out of Active, returns ok with the cancel hook, which the
    // caller must run before calling finish_cancel. otherwise, returns err with the current state.
    pub(crate) fn begin_cancel(&self) -> Result<Option<CancelHook<T, E>>, CancelState> {
        self.state
            .compare_exchange(
                CancelState::Active as u8,
                CancelState::Cancelling as u8,
                AcqRel,
                Acquire,
            )
            .map(|_| self.lock().on_cancel.take())
            .map_err(CancelState::from_byte)
    }

    // reject all parked consumers, release all state, and enter the terminal state.
    //
    // must only be called after a successful begin_cancel.
    pub(crate) fn finish_cancel(&self) -> CancelState {
        debug_assert_eq!(self.state(), CancelState::Cancelling);

        let (consumers, values, shared) = {
            let mut lock = self.lock();
            (take(&mut lock.consumers), take(&mut lock.values), lock.shared.take())
        };
        debug!(
            name = ?self.name(),
            rejected = consumers.len(),
            discarded = values.len(),
            "draining cancelled channel"
        );

        // settle outside the lock, in FIFO order
        for parked in consumers {
            // an abandoned consumer has nobody to tell
            let _ = parked.waiter.settle(Err(CancelledError.into()));
        }
        drop(values);
        drop(shared);

        self.state.store(CancelState::Cancelled as u8, Release);
        CancelState::Cancelled
    }
}
