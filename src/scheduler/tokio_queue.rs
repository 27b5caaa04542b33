//! Tokio-driven scheduler.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;

use super::{report_with, run_task, Scheduler, Task, UnhandledRejectionHook};
use crate::deferred::UnhandledRejection;

/// Scheduler that runs tasks on a single tokio task, in FIFO order.
///
/// Tasks are plain closures run inline on the driver task, so they should be
/// short; long blocking work belongs in `spawn_blocking`.
#[derive(Clone)]
pub struct TokioScheduler {
    tx: UnboundedSender<Task>,
    unhandled: Option<UnhandledRejectionHook>,
}

impl TokioScheduler {
    /// Spawn the driver on the current runtime.
    ///
    /// Panics when called outside a tokio runtime, like `tokio::spawn`.
    pub fn spawn() -> (Self, JoinHandle<usize>) {
        Self::spawn_on(&Handle::current())
    }

    /// Spawn the driver on the given runtime handle.
    ///
    /// The returned join handle resolves with the number of tasks run once
    /// every clone of the scheduler has been dropped.
    pub fn spawn_on(handle: &Handle) -> (Self, JoinHandle<usize>) {
        let (tx, mut rx) = unbounded_channel::<Task>();

        let driver = handle.spawn(async move {
            let mut ran = 0;
            while let Some(task) = rx.recv().await {
                run_task(task);
                ran += 1;
            }
            tracing::debug!(tasks_run = ran, "tokio scheduler drained");
            ran
        });

        (
            Self {
                tx,
                unhandled: None,
            },
            driver,
        )
    }

    /// Route unhandled rejections to `hook` instead of the log.
    pub fn with_unhandled_rejection_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&UnhandledRejection) + Send + Sync + 'static,
    {
        self.unhandled = Some(Arc::new(hook));
        self
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        if self.tx.send(task).is_err() {
            tracing::warn!("task scheduled after tokio scheduler stopped was dropped");
        }
    }

    fn report_unhandled(&self, rejection: &UnhandledRejection) {
        report_with(self.unhandled.as_ref(), rejection);
    }
}
