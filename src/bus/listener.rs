//! Listener identity and callback plumbing.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Token returned by `subscribe`, only good for unsubscribing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    pub(crate) id: ListenerId,
    pub(crate) event: String,
}

impl ListenerHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Event name the listener was registered for.
    pub fn event(&self) -> &str {
        &self.event
    }
}

/// Options for [`EventBus::subscribe_with`](super::EventBus::subscribe_with).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Remove the listener right before its first invocation.
    pub once: bool,
}

impl SubscribeOptions {
    pub fn once() -> Self {
        Self { once: true }
    }
}

/// What a listener callback may return.
///
/// Plain `()` callbacks never fail; `Result<(), E>` callbacks report `Err`
/// through the bus error hook.
pub trait ListenerOutput {
    fn into_outcome(self) -> Result<(), String>;
}

impl ListenerOutput for () {
    fn into_outcome(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: fmt::Display> ListenerOutput for Result<(), E> {
    fn into_outcome(self) -> Result<(), String> {
        self.map_err(|e| e.to_string())
    }
}

pub(crate) type Callback<A> = Box<dyn Fn(&[A]) -> Result<(), String> + Send + Sync>;

pub(crate) struct Entry<A> {
    pub(crate) id: ListenerId,
    pub(crate) once: bool,
    fired: AtomicBool,
    callback: Callback<A>,
}

impl<A> Entry<A> {
    pub(crate) fn new(id: ListenerId, once: bool, callback: Callback<A>) -> Self {
        Self {
            id,
            once,
            fired: AtomicBool::new(false),
            callback,
        }
    }

    /// Mark a `once` entry as fired. Only the first caller gets `true`.
    pub(crate) fn claim(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn call(&self, args: &[A]) -> Result<(), String> {
        (self.callback)(args)
    }
}
