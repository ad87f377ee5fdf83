// implementation of the handoff channel.
//
// the basic architecture is a rendezvous between two queues. it is as such:
//
// channel handles wrap around Arc<core>
//                                  |
//          /-----------------------/
//          v
//       core
//          |
//          |------ an atomic cancel state byte, checked on entry by every operation, so that
//          |       cancellation takes effect before its cleanup has finished
//          |
//          \------ a mutex around lockable state:
//                  |
//                  |------ a queue of buffered outcomes, which a producer appends to when no
//                  |       consumer is waiting
//                  |
//                  |------ a queue of parked waiters, which a consumer appends to when no outcome
//                  |       is buffered. a waiter is the settle half of a promise, and the consumer
//                  |       holds the future half. at most one of the two queues is non-empty.
//                  |
//                  \------ under the coalescing policy, a weak reference to the one shared future
//                          all consumers are currently waiting on
//
// the organization of these modules is as such:
//
//      promise<------config<----core: The dispatch engine and cancellation state machine. It
//         ^                      ^    presents a crate-private API that the exposed API wraps.
//         |                      |
//         \--------------------api: The exposed Channel handle and Next future. The crate
//                                   re-exports this API publically.
//
// there is also the error module, which contains the relevant error types, which is also
// re-exported publically.

pub(crate) mod error;
pub(crate) mod api;
pub(crate) mod config;
pub(crate) mod promise;

pub(crate) mod core;
