use thiserror::Error;

use super::listener::ListenerId;

/// Errors returned by [`EventBus`](super::EventBus) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Malformed argument, e.g. an empty event name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The listener registry lock was poisoned.
    #[error("event bus registry lock poisoned during {0}")]
    LockPoisoned(&'static str),
    /// A payload could not be turned into listener arguments.
    #[error("failed to serialize event payload: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Serialization(err.to_string())
    }
}

/// A listener failed (returned `Err` or panicked) during an emission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{listener} for event `{event}` failed: {message}")]
pub struct ListenerError {
    pub event: String,
    pub listener: ListenerId,
    pub message: String,
    /// Whether the failure was a panic rather than a returned error.
    pub panicked: bool,
}
