//! The `Deferred` primitive.

use std::fmt;
use std::future::IntoFuture;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;

use super::error::UnhandledRejection;
use super::outcome::{Outcome, State};
use super::settled::Settled;
use crate::scheduler::Scheduler;

type Observer<T, E> = Box<dyn FnOnce(&Outcome<T, E>) + Send + 'static>;

/// A single-shot container for a value or an error that arrives later.
///
/// Cloning yields another handle to the same state, so a producer can keep
/// one clone to settle while consumers observe through others.
///
/// - The first `fulfill`/`reject` wins; later calls return `false`.
/// - Observers run on the bound scheduler, in the order they were attached.
/// - If the last handle of a rejected deferred is dropped and nobody ever
///   observed it, the scheduler's unhandled-rejection hook is called.
///
/// ## Example
///
/// ```
/// use deferred_bus::{Deferred, TaskQueue};
/// use std::sync::{Arc, Mutex};
///
/// let queue = TaskQueue::new();
/// let deferred: Deferred<u32, String> = Deferred::new(queue.clone());
///
/// let log = Arc::new(Mutex::new(Vec::new()));
/// let (ok, err) = (log.clone(), log.clone());
/// deferred.on_settle(
///     move |v| ok.lock().unwrap().push(format!("value {}", v)),
///     move |e| err.lock().unwrap().push(format!("error {}", e)),
/// );
///
/// assert!(deferred.reject("boom".to_string()));
/// assert!(!deferred.fulfill(1));
///
/// queue.run_until_idle();
/// assert_eq!(*log.lock().unwrap(), vec!["error boom".to_string()]);
/// ```
pub struct Deferred<T, E> {
    shared: Arc<Shared<T, E>>,
}

struct Shared<T, E> {
    scheduler: Arc<dyn Scheduler>,
    inner: Mutex<Inner<T, E>>,
    describe: fn(&E) -> String,
}

struct Inner<T, E> {
    outcome: Option<Arc<Outcome<T, E>>>,
    observers: Vec<Observer<T, E>>,
    rejection_observed: bool,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> Deferred<T, E>
where
    T: Send + Sync + 'static,
    E: fmt::Debug + Send + Sync + 'static,
{
    /// Create a pending deferred that delivers through `scheduler`.
    pub fn new<S: Scheduler + 'static>(scheduler: S) -> Self {
        Self::with_scheduler(Arc::new(scheduler))
    }

    /// Create a deferred that is already fulfilled.
    pub fn fulfilled<S: Scheduler + 'static>(scheduler: S, value: T) -> Self {
        let deferred = Self::new(scheduler);
        deferred.fulfill(value);
        deferred
    }

    /// Create a deferred that is already rejected.
    pub fn rejected<S: Scheduler + 'static>(scheduler: S, error: E) -> Self {
        let deferred = Self::new(scheduler);
        deferred.reject(error);
        deferred
    }

    pub(crate) fn with_scheduler(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                scheduler,
                inner: Mutex::new(Inner {
                    outcome: None,
                    observers: Vec::new(),
                    rejection_observed: false,
                }),
                describe: |error| format!("{:?}", error),
            }),
        }
    }

    /// Settle with `value`. Returns `false` if already settled.
    pub fn fulfill(&self, value: T) -> bool {
        self.settle(Outcome::Fulfilled(value))
    }

    /// Settle with `error`. Returns `false` if already settled.
    pub fn reject(&self, error: E) -> bool {
        self.settle(Outcome::Rejected(error))
    }

    /// Settle from a `Result`.
    pub fn resolve(&self, result: Result<T, E>) -> bool {
        self.settle(result.into())
    }

    fn settle(&self, outcome: Outcome<T, E>) -> bool {
        let mut inner = self.inner();
        if inner.outcome.is_some() {
            tracing::trace!("ignoring resolution of settled deferred");
            return false;
        }
        let outcome = Arc::new(outcome);
        inner.outcome = Some(Arc::clone(&outcome));
        let observers = mem::take(&mut inner.observers);

        tracing::debug!(
            state = ?outcome.state(),
            observers = observers.len(),
            "deferred settled"
        );

        // Enqueue while still locked so a racing late observer lands behind this batch.
        if !observers.is_empty() {
            self.shared.scheduler.schedule(Box::new(move || {
                for observer in observers {
                    observer(&outcome);
                }
            }));
        }
        true
    }

    /// Attach a pair of callbacks; exactly one of them runs, exactly once.
    ///
    /// If the deferred is already settled the matching callback is scheduled
    /// right away. It still runs on the scheduler, never inside this call.
    pub fn on_settle<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(&T) + Send + 'static,
        R: FnOnce(&E) + Send + 'static,
    {
        self.observe(move |outcome| match outcome {
            Outcome::Fulfilled(value) => on_fulfilled(value),
            Outcome::Rejected(error) => on_rejected(error),
        });
    }

    /// Attach a callback that only cares about a successful value.
    ///
    /// Does not count as handling a rejection; an otherwise unobserved
    /// rejection is still reported when the deferred is dropped.
    pub fn on_fulfilled<F>(&self, on_fulfilled: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.attach(
            move |outcome: &Outcome<T, E>| {
                if let Outcome::Fulfilled(value) = outcome {
                    on_fulfilled(value);
                }
            },
            false,
        );
    }

    /// Attach a callback that only cares about a rejection.
    pub fn on_rejected<R>(&self, on_rejected: R)
    where
        R: FnOnce(&E) + Send + 'static,
    {
        self.on_settle(|_| {}, on_rejected);
    }

    /// Attach a callback receiving the whole outcome.
    pub fn observe<F>(&self, observer: F)
    where
        F: FnOnce(&Outcome<T, E>) + Send + 'static,
    {
        self.attach(observer, true);
    }

    fn attach<F>(&self, observer: F, sees_rejection: bool)
    where
        F: FnOnce(&Outcome<T, E>) + Send + 'static,
    {
        let mut inner = self.inner();
        if sees_rejection {
            inner.rejection_observed = true;
        }
        let settled = inner.outcome.clone();
        match settled {
            // Scheduled under the lock to keep attachment order across threads.
            Some(outcome) => self
                .shared
                .scheduler
                .schedule(Box::new(move || observer(&outcome))),
            None => inner.observers.push(Box::new(observer)),
        }
    }

    /// Chain a fallible step on the fulfilled value.
    ///
    /// Rejections skip `f` and propagate to the returned deferred.
    pub fn then<U, F>(&self, f: F) -> Deferred<U, E>
    where
        U: Send + Sync + 'static,
        E: Clone,
        F: FnOnce(&T) -> Result<U, E> + Send + 'static,
    {
        let next = Deferred::with_scheduler(Arc::clone(&self.shared.scheduler));
        let producer = next.clone();
        self.observe(move |outcome| {
            producer.resolve(match outcome {
                Outcome::Fulfilled(value) => f(value),
                Outcome::Rejected(error) => Err(error.clone()),
            });
        });
        next
    }

    /// Chain an infallible transformation of the fulfilled value.
    pub fn map<U, F>(&self, f: F) -> Deferred<U, E>
    where
        U: Send + Sync + 'static,
        E: Clone,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        self.then(move |value| Ok(f(value)))
    }

    /// Handle a rejection, either recovering with a value or rejecting again.
    ///
    /// Fulfilled values pass through untouched.
    pub fn catch<F>(&self, f: F) -> Deferred<T, E>
    where
        T: Clone,
        F: FnOnce(&E) -> Result<T, E> + Send + 'static,
    {
        let next = Deferred::with_scheduler(Arc::clone(&self.shared.scheduler));
        let producer = next.clone();
        self.observe(move |outcome| {
            producer.resolve(match outcome {
                Outcome::Fulfilled(value) => Ok(value.clone()),
                Outcome::Rejected(error) => f(error),
            });
        });
        next
    }

    /// A future resolving once the outcome has been delivered.
    pub fn settled(&self) -> Settled<T, E>
    where
        T: Clone,
        E: Clone,
    {
        let (tx, rx) = oneshot::channel();
        let scheduler = Arc::clone(&self.shared.scheduler);
        let describe = self.shared.describe;
        self.observe(move |outcome| {
            let sent = tx.send(match outcome {
                Outcome::Fulfilled(value) => Ok(value.clone()),
                Outcome::Rejected(error) => Err(error.clone()),
            });
            // The future was dropped before delivery; nobody saw the error.
            if let (Err(_), Outcome::Rejected(error)) = (sent, outcome) {
                scheduler.report_unhandled(&UnhandledRejection {
                    message: describe(error),
                });
            }
        });
        Settled::new(rx)
    }

    pub fn state(&self) -> State {
        match &self.inner().outcome {
            Some(outcome) => outcome.state(),
            None => State::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    /// Read the stored outcome, if settled.
    ///
    /// Reading a rejection counts as handling it.
    pub fn outcome(&self) -> Option<Arc<Outcome<T, E>>> {
        let mut inner = self.inner();
        let outcome = inner.outcome.clone();
        if outcome.is_some() {
            inner.rejection_observed = true;
        }
        outcome
    }

    /// Number of observers waiting for settlement.
    pub fn pending_observers(&self) -> usize {
        self.inner().observers.len()
    }

    fn inner(&self) -> MutexGuard<'_, Inner<T, E>> {
        // Observers never run under this lock, so poisoning cannot leave it inconsistent.
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, E> IntoFuture for Deferred<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + fmt::Debug + Send + Sync + 'static,
{
    type Output = <Settled<T, E> as std::future::Future>::Output;
    type IntoFuture = Settled<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        self.settled()
    }
}

impl<T, E> fmt::Debug for Deferred<T, E>
where
    T: fmt::Debug,
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self
            .shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Deferred")
            .field("outcome", &inner.outcome)
            .field("observers", &inner.observers.len())
            .finish()
    }
}

impl<T, E> Drop for Shared<T, E> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.rejection_observed {
            return;
        }
        if let Some(Outcome::Rejected(error)) = inner.outcome.as_deref() {
            let rejection = UnhandledRejection {
                message: (self.describe)(error),
            };
            self.scheduler.report_unhandled(&rejection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskQueue;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (log.clone(), log)
    }

    #[test]
    fn starts_pending() {
        let deferred: Deferred<u8, String> = Deferred::new(TaskQueue::new());
        assert_eq!(deferred.state(), State::Pending);
        assert!(deferred.is_pending());
        assert!(deferred.outcome().is_none());
    }

    #[test]
    fn first_resolution_wins() {
        let deferred: Deferred<u8, String> = Deferred::new(TaskQueue::new());

        assert!(deferred.fulfill(1));
        assert!(!deferred.fulfill(2));
        assert!(!deferred.reject("late".to_string()));

        assert_eq!(deferred.state(), State::Fulfilled);
        assert_eq!(deferred.outcome().unwrap().value(), Some(&1));
    }

    #[test]
    fn observers_wait_for_the_scheduler() {
        let queue = TaskQueue::new();
        let deferred: Deferred<u8, String> = Deferred::new(queue.clone());
        let (sink, log) = recorder();

        deferred.on_fulfilled(move |v| sink.lock().unwrap().push(v.to_string()));
        assert_eq!(deferred.pending_observers(), 1);

        deferred.fulfill(9);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(deferred.pending_observers(), 0);

        queue.run_until_idle();
        assert_eq!(*log.lock().unwrap(), vec!["9".to_string()]);
    }

    #[test]
    fn settle_batches_observers_into_one_task() {
        let queue = TaskQueue::new();
        let deferred: Deferred<u8, String> = Deferred::new(queue.clone());

        for _ in 0..3 {
            deferred.on_fulfilled(|_| {});
        }
        deferred.fulfill(1);

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn then_propagates_rejection_without_calling_step() {
        let queue = TaskQueue::new();
        let deferred: Deferred<u8, String> = Deferred::new(queue.clone());
        let (sink, log) = recorder();

        let step_log = sink.clone();
        let next = deferred.then(move |v| {
            step_log.lock().unwrap().push("step".to_string());
            Ok::<_, String>(*v as u32 * 2)
        });
        next.on_rejected(move |e| sink.lock().unwrap().push(e.clone()));

        deferred.reject("boom".to_string());
        queue.run_until_idle();

        assert_eq!(*log.lock().unwrap(), vec!["boom".to_string()]);
        assert_eq!(next.state(), State::Rejected);
    }

    #[test]
    fn catch_turns_rejection_into_value() {
        let queue = TaskQueue::new();
        let deferred: Deferred<u8, String> = Deferred::new(queue.clone());

        let recovered = deferred.catch(|e| Ok(e.len() as u8));
        deferred.reject("four".to_string());
        queue.run_until_idle();

        assert_eq!(recovered.outcome().unwrap().value(), Some(&4));
    }

    #[test]
    fn unobserved_rejection_is_reported_on_drop() {
        let (sink, log) = recorder();
        let queue = TaskQueue::new()
            .with_unhandled_rejection_hook(move |r| sink.lock().unwrap().push(r.message.clone()));

        let deferred: Deferred<u8, String> = Deferred::new(queue.clone());
        deferred.reject("lost".to_string());
        drop(deferred);

        assert_eq!(*log.lock().unwrap(), vec!["\"lost\"".to_string()]);
    }

    #[test]
    fn observed_or_read_rejection_is_not_reported() {
        let (sink, log) = recorder();
        let queue = TaskQueue::new()
            .with_unhandled_rejection_hook(move |r| sink.lock().unwrap().push(r.message.clone()));

        let observed: Deferred<u8, String> = Deferred::new(queue.clone());
        observed.on_rejected(|_| {});
        observed.reject("seen".to_string());
        drop(observed);

        let read: Deferred<u8, String> = Deferred::rejected(queue.clone(), "read".to_string());
        assert!(read.outcome().is_some());
        drop(read);

        let fulfilled: Deferred<u8, String> = Deferred::fulfilled(queue.clone(), 1);
        drop(fulfilled);

        queue.run_until_idle();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn fulfillment_only_observer_does_not_swallow_rejection() {
        let (sink, log) = recorder();
        let queue = TaskQueue::new()
            .with_unhandled_rejection_hook(move |r| sink.lock().unwrap().push(r.message.clone()));

        let deferred: Deferred<u8, String> = Deferred::new(queue.clone());
        let (value_sink, values) = recorder();
        deferred.on_fulfilled(move |v| value_sink.lock().unwrap().push(v.to_string()));
        deferred.reject("lost".to_string());
        queue.run_until_idle();
        drop(deferred);

        assert!(values.lock().unwrap().is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["\"lost\"".to_string()]);
    }

    #[test]
    fn dropped_settled_future_reports_rejection() {
        let (sink, log) = recorder();
        let queue = TaskQueue::new()
            .with_unhandled_rejection_hook(move |r| sink.lock().unwrap().push(r.message.clone()));

        let deferred: Deferred<u8, String> = Deferred::new(queue.clone());
        drop(deferred.settled());
        deferred.reject("nobody awaited".to_string());
        queue.run_until_idle();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["\"nobody awaited\"".to_string()]
        );

        // Delivered to a live future: nothing to report.
        log.lock().unwrap().clear();
        let awaited: Deferred<u8, String> = Deferred::new(queue.clone());
        let settled = awaited.settled();
        awaited.reject("seen".to_string());
        queue.run_until_idle();
        drop(settled);
        drop(awaited);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn clones_share_state() {
        let deferred: Deferred<u8, String> = Deferred::new(TaskQueue::new());
        let producer = deferred.clone();

        producer.fulfill(3);
        assert_eq!(deferred.state(), State::Fulfilled);
        assert!(format!("{:?}", deferred).contains("Fulfilled(3)"));
    }
}
