//! Background thread that runs scheduled tasks.

use std::io;
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use super::{report_with, run_task, Scheduler, Task, UnhandledRejectionHook};
use crate::deferred::UnhandledRejection;

/// Statistics returned when the worker thread stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThreadStats {
    pub tasks_run: usize,
    pub tasks_panicked: usize,
}

/// A scheduler backed by one dedicated worker thread.
///
/// Tasks run on the worker in the order they were scheduled. Clones share
/// the worker; it exits once [`shutdown`](Self::shutdown) is called or every
/// clone is dropped.
///
/// ## Example
///
/// ```
/// use deferred_bus::{Deferred, ThreadScheduler};
/// use std::sync::mpsc::channel;
///
/// let scheduler = ThreadScheduler::spawn().unwrap();
/// let deferred: Deferred<u32, String> = Deferred::new(scheduler.clone());
///
/// let (tx, rx) = channel();
/// deferred.on_settle(move |v| tx.send(*v).unwrap(), |_| {});
/// deferred.fulfill(7);
///
/// assert_eq!(rx.recv().unwrap(), 7);
/// scheduler.shutdown();
/// ```
#[derive(Clone)]
pub struct ThreadScheduler {
    sender: Arc<Mutex<Option<Sender<Task>>>>,
    handle: Arc<Mutex<Option<JoinHandle<ThreadStats>>>>,
    unhandled: Option<UnhandledRejectionHook>,
}

impl ThreadScheduler {
    /// Spawn the worker thread with the default name.
    pub fn spawn() -> io::Result<Self> {
        Self::spawn_named("deferred-scheduler")
    }

    /// Spawn the worker thread with a custom thread name.
    pub fn spawn_named(name: &str) -> io::Result<Self> {
        let (tx, rx) = channel::<Task>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut stats = ThreadStats::default();
                // Ends when every sender is gone.
                for task in rx {
                    stats.tasks_run += 1;
                    if !run_task(task) {
                        stats.tasks_panicked += 1;
                    }
                }
                stats
            })?;

        tracing::debug!(thread = name, "scheduler thread started");

        Ok(Self {
            sender: Arc::new(Mutex::new(Some(tx))),
            handle: Arc::new(Mutex::new(Some(handle))),
            unhandled: None,
        })
    }

    /// Route unhandled rejections to `hook` instead of the log.
    pub fn with_unhandled_rejection_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&UnhandledRejection) + Send + Sync + 'static,
    {
        self.unhandled = Some(Arc::new(hook));
        self
    }

    /// Stop accepting tasks, let the worker finish what is queued, and join it.
    ///
    /// Returns `None` if the worker was already joined by another clone.
    pub fn shutdown(&self) -> Option<ThreadStats> {
        self.sender().take();
        let handle = lock(&self.handle).take()?;
        match handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                tracing::error!("scheduler thread terminated abnormally");
                None
            }
        }
    }

    /// Whether the worker still accepts tasks.
    pub fn is_running(&self) -> bool {
        self.sender().is_some()
    }

    fn sender(&self) -> MutexGuard<'_, Option<Sender<Task>>> {
        lock(&self.sender)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, task: Task) {
        let delivered = match self.sender().as_ref() {
            Some(tx) => tx.send(task).is_ok(),
            None => false,
        };
        if !delivered {
            tracing::warn!("task scheduled after scheduler shutdown was dropped");
        }
    }

    fn report_unhandled(&self, rejection: &UnhandledRejection) {
        report_with(self.unhandled.as_ref(), rejection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn runs_tasks_in_order_off_the_caller_thread() {
        let scheduler = ThreadScheduler::spawn_named("order-test").unwrap();
        let (tx, rx) = mpsc::channel();
        let caller = thread::current().id();

        for i in 0..5 {
            let tx = tx.clone();
            scheduler.schedule(Box::new(move || {
                tx.send((i, thread::current().id())).unwrap();
            }));
        }

        let received: Vec<_> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(
            received.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert!(received.iter().all(|(_, id)| *id != caller));

        let stats = scheduler.shutdown().unwrap();
        assert_eq!(stats.tasks_run, 5);
    }

    #[test]
    fn survives_panicking_task() {
        let scheduler = ThreadScheduler::spawn().unwrap();
        let (tx, rx) = mpsc::channel();

        scheduler.schedule(Box::new(|| panic!("bad observer")));
        scheduler.schedule(Box::new(move || tx.send("after").unwrap()));

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "after");

        let stats = scheduler.shutdown().unwrap();
        assert_eq!(
            stats,
            ThreadStats {
                tasks_run: 2,
                tasks_panicked: 1
            }
        );
    }

    #[test]
    fn shutdown_is_idempotent_and_drops_late_tasks() {
        let scheduler = ThreadScheduler::spawn().unwrap();
        assert!(scheduler.is_running());

        assert!(scheduler.shutdown().is_some());
        assert!(scheduler.shutdown().is_none());
        assert!(!scheduler.is_running());

        // No worker left; the task is dropped with a warning.
        scheduler.schedule(Box::new(|| unreachable!()));
    }
}
