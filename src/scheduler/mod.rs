//! Schedulers - where deferred observer callbacks run.
//!
//! A [`Deferred`](crate::Deferred) never calls its observers from inside
//! `fulfill`, `reject` or `on_settle`. Delivery is handed to a [`Scheduler`]
//! as a boxed [`Task`] and runs on the scheduler's next opportunity.
//!
//! ```text
//! fulfill(v) ──► Scheduler::schedule(task) ──► task runs observers in order
//! ```
//!
//! Implementations:
//! - [`TaskQueue`] - drained by the caller (`run_until_idle`), deterministic
//! - [`ThreadScheduler`] - one worker thread fed by a channel
//! - `TokioScheduler` - one tokio task fed by a channel (feature `tokio`)

mod task_queue;
mod thread;
#[cfg(feature = "tokio")]
mod tokio_queue;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::deferred::UnhandledRejection;

pub use task_queue::TaskQueue;
pub use thread::{ThreadScheduler, ThreadStats};
#[cfg(feature = "tokio")]
pub use tokio_queue::TokioScheduler;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Callback receiving rejections nobody observed.
pub type UnhandledRejectionHook = Arc<dyn Fn(&UnhandledRejection) + Send + Sync>;

/// Runs tasks at a later scheduling opportunity, in the order they were scheduled.
pub trait Scheduler: Send + Sync {
    /// Queue a task. Must never run it on the caller's stack.
    fn schedule(&self, task: Task);

    /// Report a rejected deferred that was dropped without any observer.
    fn report_unhandled(&self, rejection: &UnhandledRejection) {
        tracing::warn!(reason = %rejection.message, "unhandled deferred rejection");
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule(&self, task: Task) {
        (**self).schedule(task)
    }

    fn report_unhandled(&self, rejection: &UnhandledRejection) {
        (**self).report_unhandled(rejection)
    }
}

/// Run a task, logging instead of unwinding if it panics.
///
/// Returns `false` when the task panicked.
pub(crate) fn run_task(task: Task) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(panic = %panic_message(payload.as_ref()), "scheduled task panicked");
            false
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub(crate) fn report_with(hook: Option<&UnhandledRejectionHook>, rejection: &UnhandledRejection) {
    match hook {
        Some(hook) => hook(rejection),
        None => tracing::warn!(reason = %rejection.message, "unhandled deferred rejection"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_task_reports_panics() {
        assert!(run_task(Box::new(|| {})));
        assert!(!run_task(Box::new(|| panic!("boom"))));
    }

    #[test]
    fn panic_message_reads_both_string_kinds() {
        let static_payload: Box<dyn Any + Send> = Box::new("static");
        let owned_payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other_payload: Box<dyn Any + Send> = Box::new(42_u32);

        assert_eq!(panic_message(static_payload.as_ref()), "static");
        assert_eq!(panic_message(owned_payload.as_ref()), "owned");
        assert_eq!(panic_message(other_payload.as_ref()), "non-string panic payload");
    }
}
