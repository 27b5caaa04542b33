use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use super::error::SettleError;

/// Future returned by [`Deferred::settled`](crate::Deferred::settled).
///
/// Completes when the scheduler delivers the outcome, not at the moment of
/// settlement. With a [`TaskQueue`](crate::TaskQueue) that means after the
/// queue is drained.
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct Settled<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> Settled<T, E> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T, E>>) -> Self {
        Self { rx }
    }
}

impl<T, E> Future for Settled<T, E> {
    type Output = Result<T, SettleError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result.map_err(SettleError::Rejected)),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(SettleError::Dropped)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Scheduler, Task};
    use crate::{Deferred, TaskQueue};
    use futures::executor::block_on;
    use futures::FutureExt;

    #[test]
    fn resolves_after_queue_drains() {
        let queue = TaskQueue::new();
        let deferred: Deferred<String, String> = Deferred::new(queue.clone());

        let mut settled = deferred.settled();
        deferred.fulfill("time up..!".to_string());

        // Settled but not delivered yet.
        assert!((&mut settled).now_or_never().is_none());

        queue.run_until_idle();
        assert_eq!(block_on(settled), Ok("time up..!".to_string()));
    }

    #[test]
    fn rejection_maps_to_settle_error() {
        let queue = TaskQueue::new();
        let deferred: Deferred<u8, String> = Deferred::rejected(queue.clone(), "boom".to_string());

        let settled = deferred.settled();
        queue.run_until_idle();

        let err = block_on(settled).unwrap_err();
        assert_eq!(err.clone().into_rejection(), Some("boom".to_string()));
        assert_eq!(err.to_string(), "deferred rejected: boom");
    }

    struct Discard;

    impl Scheduler for Discard {
        fn schedule(&self, _task: Task) {}
    }

    #[test]
    fn dropped_delivery_is_reported() {
        let deferred: Deferred<u8, String> = Deferred::new(Discard);
        let settled = deferred.settled();
        deferred.fulfill(1);

        assert_eq!(block_on(settled), Err(SettleError::Dropped));
    }
}
