use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::deferred::Deferred;
use crate::scheduler::Scheduler;

fn settle_after<T, E>(
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
    result: Result<T, E>,
) -> Deferred<T, E>
where
    T: Send + Sync + 'static,
    E: fmt::Debug + Send + Sync + 'static,
{
    let deferred = Deferred::with_scheduler(scheduler);
    let producer = deferred.clone();

    thread::spawn(move || {
        thread::sleep(delay);
        producer.resolve(result);
    });

    deferred
}

/// Fulfill with `value` once `delay` has elapsed.
///
/// ## Example
///
/// ```
/// use deferred_bus::producer::resolve_after;
/// use deferred_bus::ThreadScheduler;
/// use futures::executor::block_on;
/// use std::time::Duration;
///
/// let scheduler = ThreadScheduler::spawn().unwrap();
/// let timer = resolve_after::<_, String, _>(scheduler.clone(), Duration::from_millis(10), "time up..!");
///
/// assert_eq!(block_on(timer.settled()), Ok("time up..!"));
/// ```
pub fn resolve_after<T, E, S>(scheduler: S, delay: Duration, value: T) -> Deferred<T, E>
where
    T: Send + Sync + 'static,
    E: fmt::Debug + Send + Sync + 'static,
    S: Scheduler + 'static,
{
    settle_after(Arc::new(scheduler), delay, Ok(value))
}

/// Reject with `error` once `delay` has elapsed.
pub fn reject_after<T, E, S>(scheduler: S, delay: Duration, error: E) -> Deferred<T, E>
where
    T: Send + Sync + 'static,
    E: fmt::Debug + Send + Sync + 'static,
    S: Scheduler + 'static,
{
    settle_after(Arc::new(scheduler), delay, Err(error))
}
