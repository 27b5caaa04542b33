use thiserror::Error;

/// A rejected deferred was dropped without any observer ever seeing the error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unhandled deferred rejection: {message}")]
pub struct UnhandledRejection {
    /// `Debug` rendering of the rejection error.
    pub message: String,
}

/// Failure side of awaiting a deferred via [`Settled`](super::Settled).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettleError<E> {
    /// The deferred was rejected with this error.
    #[error("deferred rejected: {0}")]
    Rejected(E),
    /// The scheduler dropped the delivery task (e.g. it was shut down).
    #[error("deferred delivery was dropped by its scheduler")]
    Dropped,
}

impl<E> SettleError<E> {
    /// The rejection error, if this is a rejection.
    pub fn into_rejection(self) -> Option<E> {
        match self {
            SettleError::Rejected(error) => Some(error),
            SettleError::Dropped => None,
        }
    }
}
