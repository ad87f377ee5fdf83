// channel error types.

use super::core::CancelState;
use thiserror::Error;


// ==== base error types ====


/// Signal that a channel was cancelled before a waiting consumer received anything
///
/// Every consumer future still pending when the channel is cancelled settles with this signal.
/// It is a distinct type, so it can never be confused with an application failure, whatever the
/// failure's text happens to be.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("channel was cancelled")]
pub struct CancelledError;

/// Error for calling [`Channel::next`][crate::Channel::next] once the channel has begun
/// cancelling
///
/// This is a usage error rather than a recoverable condition: it is returned synchronously
/// instead of through a future, so that clearly-wrong call sequencing fails fast.
#[derive(Error, Debug, Clone, Eq, PartialEq, Hash)]
#[error("next called on channel {name:?} after cancellation ({state:?})")]
pub struct AfterCancelError {
    /// Name the channel was configured with, if any
    pub name: Option<String>,
    /// State the channel was observed in (never [`CancelState::Active`])
    pub state: CancelState,
}


// ==== compound error types ====


/// Failure outcome of a [`Next`][crate::future::Next] future
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum NextError<E> {
    /// A producer rejected with this reason
    #[error("producer rejected: {0:?}")]
    Failed(E),
    /// The channel was cancelled while this consumer was waiting
    #[error(transparent)]
    Cancelled(CancelledError),
}

impl<E> From<CancelledError> for NextError<E> {
    fn from(inner: CancelledError) -> Self {
        NextError::Cancelled(inner)
    }
}

impl<E> NextError<E> {
    /// Whether this is the cancellation signal rather than an application failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NextError::Cancelled(_))
    }

    /// The application failure reason, if this is one
    pub fn into_failure(self) -> Option<E> {
        match self {
            NextError::Failed(reason) => Some(reason),
            NextError::Cancelled(_) => None,
        }
    }
}

/// Outcome a consumer receives: the published value, or why there is none
pub type Outcome<T, E> = Result<T, NextError<E>>;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_distinct_from_failure_with_same_text() {
        let failed: NextError<String> = NextError::Failed("channel was cancelled".to_owned());
        let cancelled: NextError<String> = CancelledError.into();
        assert!(!failed.is_cancelled());
        assert!(cancelled.is_cancelled());
        assert_ne!(failed, cancelled);
        assert_eq!(cancelled.to_string(), "channel was cancelled");
        assert_eq!(failed.into_failure().as_deref(), Some("channel was cancelled"));
        assert_eq!(cancelled.into_failure(), None);
    }

    #[test]
    fn after_cancel_error_names_channel() {
        let e = AfterCancelError { name: Some("jobs".to_owned()), state: CancelState::Cancelled };
        let msg = e.to_string();
        assert!(msg.contains("\"jobs\""), "{}", msg);
        assert!(msg.contains("after cancellation"), "{}", msg);
    }
}
