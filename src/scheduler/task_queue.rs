//! Caller-drained task queue for tests and single-threaded hosts.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{report_with, run_task, Scheduler, Task, UnhandledRejectionHook};
use crate::deferred::UnhandledRejection;

/// FIFO task queue drained explicitly by its owner.
///
/// Clones share the same queue, so one clone can be handed to every
/// [`Deferred`](crate::Deferred) while another drives it.
///
/// ## Example
///
/// ```
/// use deferred_bus::{Deferred, TaskQueue};
/// use std::sync::{Arc, Mutex};
///
/// let queue = TaskQueue::new();
/// let deferred: Deferred<&str, String> = Deferred::new(queue.clone());
///
/// let seen = Arc::new(Mutex::new(None));
/// let sink = seen.clone();
/// deferred.on_settle(move |v| *sink.lock().unwrap() = Some(*v), |_| {});
/// deferred.fulfill("time up..!");
///
/// // Nothing runs until the queue is drained.
/// assert!(seen.lock().unwrap().is_none());
/// queue.run_until_idle();
/// assert_eq!(*seen.lock().unwrap(), Some("time up..!"));
/// ```
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
    unhandled: Option<UnhandledRejectionHook>,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route unhandled rejections to `hook` instead of the log.
    pub fn with_unhandled_rejection_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&UnhandledRejection) + Send + Sync + 'static,
    {
        self.unhandled = Some(Arc::new(hook));
        self
    }

    /// Run the oldest queued task. Returns `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        // Pop before running so the task can schedule more work.
        let task = self.tasks().pop_front();
        match task {
            Some(task) => {
                run_task(task);
                true
            }
            None => false,
        }
    }

    /// Run tasks until the queue is empty, including tasks queued while
    /// draining. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    fn tasks(&self) -> MutexGuard<'_, VecDeque<Task>> {
        // Tasks never run under this lock, so a poisoned guard still holds a valid queue.
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) {
        self.tasks().push_back(task);
    }

    fn report_unhandled(&self, rejection: &UnhandledRejection) {
        report_with(self.unhandled.as_ref(), rejection);
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.len())
            .field("custom_unhandled_hook", &self.unhandled.is_some())
            .finish()
    }
}
