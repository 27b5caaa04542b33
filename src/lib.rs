//! In-process event bus and single-shot deferred values.
//!
//! - [`EventBus`]: named events, ordered synchronous listeners, `once`
//!   listeners, per-listener failure isolation.
//! - [`Deferred`]: settles once with a value or an error and delivers it to
//!   every observer through a [`Scheduler`], never on the caller's stack.
//!
//! The two do not depend on each other, but compose freely: a listener may
//! settle a deferred, and a deferred observer may emit on a bus.
//!
//! ```
//! use deferred_bus::{Deferred, EventBus, TaskQueue};
//! use serde_json::{json, Value};
//!
//! let queue = TaskQueue::new();
//! let bus = EventBus::new();
//! let response: Deferred<Value, String> = Deferred::new(queue.clone());
//!
//! let producer = response.clone();
//! bus.once("response", move |args: &[Value]| {
//!     producer.fulfill(args[0].clone());
//! })
//! .unwrap();
//!
//! bus.emit("response", &[json!("data received")]).unwrap();
//! queue.run_until_idle();
//! assert_eq!(response.outcome().unwrap().value(), Some(&json!("data received")));
//! ```

pub mod bus;
pub mod deferred;
pub mod producer;
pub mod scheduler;

pub use bus::{BusError, EventBus, ListenerError, ListenerHandle, ListenerId, SubscribeOptions};
pub use deferred::{Deferred, Outcome, SettleError, Settled, State, UnhandledRejection};
pub use producer::ReadError;
pub use scheduler::{Scheduler, Task, TaskQueue, ThreadScheduler, ThreadStats};

#[cfg(feature = "tokio")]
pub use scheduler::TokioScheduler;
