use serde::Serialize;

/// Lifecycle state of a [`Deferred`](crate::Deferred).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

impl State {
    pub fn is_terminal(self) -> bool {
        !matches!(self, State::Pending)
    }
}

/// The stored result of a settled deferred. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Outcome<T, E> {
    pub fn state(&self) -> State {
        match self {
            Outcome::Fulfilled(_) => State::Fulfilled,
            Outcome::Rejected(_) => State::Rejected,
        }
    }

    /// The fulfillment value, if fulfilled.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Fulfilled(value) => Some(value),
            Outcome::Rejected(_) => None,
        }
    }

    /// The rejection error, if rejected.
    pub fn error(&self) -> Option<&E> {
        match self {
            Outcome::Fulfilled(_) => None,
            Outcome::Rejected(error) => Some(error),
        }
    }

    pub fn as_result(&self) -> Result<&T, &E> {
        match self {
            Outcome::Fulfilled(value) => Ok(value),
            Outcome::Rejected(error) => Err(error),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Fulfilled(value),
            Err(error) => Outcome::Rejected(error),
        }
    }
}
