//! Event bus - named-event publish/subscribe.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      EventBus<A>                             │
//! │  subscribe / once / unsubscribe / emit                      │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Registry (Arc<Mutex<..>>, shared by clones)         │
//! │  event name -> [listener, listener, ...] in insertion order │
//! └─────────────────────────────────────────────────────────────┘
//!                            │  emit: snapshot, then unlock
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  callbacks run in order on the caller's thread;             │
//! │  failures -> ListenerError -> error hook, loop continues    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A listener must be subscribed before an emission for that emission to
//! reach it; emitting an event nobody listens to is a silent no-op.

mod error;
mod event_bus;
mod listener;

pub use error::{BusError, ListenerError};
pub use event_bus::{ErrorHook, EventBus, DEFAULT_MAX_LISTENERS};
pub use listener::{ListenerHandle, ListenerId, ListenerOutput, SubscribeOptions};
