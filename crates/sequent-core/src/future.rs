//! Settle-once completion cell.
//!
//! A submitted task gets one cell with two sides:
//! - [`Promise`]: the single writer, held by the task's record
//! - [`TaskFuture`]: cloneable reader handles given to callers
//!
//! Settling publishes the outcome under the cell's mutex and wakes every
//! listener (blocked waiters, batch waits, async wakers), so a value written
//! by the worker is visible to any later read on any thread.

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tracing::warn;

use crate::domain::{FutureState, TaskId};
use crate::error::{AlreadySettled, ExecError, TaskFailure};
use crate::sync::{Signal, Waiter, deadline_after, lock};

enum Outcome<T> {
    Pending,
    Completed(T),
    Failed(Arc<TaskFailure>),
    Cancelled,
}

impl<T> Outcome<T> {
    fn state(&self) -> FutureState {
        match self {
            Outcome::Pending => FutureState::Pending,
            Outcome::Completed(_) => FutureState::Completed,
            Outcome::Failed(_) => FutureState::Failed,
            Outcome::Cancelled => FutureState::Cancelled,
        }
    }
}

impl<T: Clone> Outcome<T> {
    fn read(&self) -> Option<Result<T, ExecError>> {
        match self {
            Outcome::Pending => None,
            Outcome::Completed(value) => Some(Ok(value.clone())),
            Outcome::Failed(failure) => Some(Err(ExecError::Execution(Arc::clone(failure)))),
            Outcome::Cancelled => Some(Err(ExecError::Cancelled)),
        }
    }
}

enum Listener {
    Signal(Weak<Signal>),
    Waker(Waker),
}

impl Listener {
    fn wake(self) {
        match self {
            Listener::Signal(signal) => {
                if let Some(signal) = signal.upgrade() {
                    signal.notify();
                }
            }
            Listener::Waker(waker) => waker.wake(),
        }
    }

    /// A signal whose waiter has gone away.
    fn is_dead(&self) -> bool {
        matches!(self, Listener::Signal(signal) if signal.strong_count() == 0)
    }
}

struct Slot<T> {
    outcome: Outcome<T>,
    listeners: Vec<Listener>,
}

struct Shared<T> {
    id: TaskId,
    slot: Mutex<Slot<T>>,
}

impl<T> Shared<T> {
    fn settle(&self, outcome: Outcome<T>) -> Result<(), AlreadySettled> {
        let listeners = {
            let mut slot = lock(&self.slot);
            if !matches!(slot.outcome, Outcome::Pending) {
                return Err(AlreadySettled);
            }
            slot.outcome = outcome;
            std::mem::take(&mut slot.listeners)
        };
        // lock の外で起こす
        for listener in listeners {
            listener.wake();
        }
        Ok(())
    }
}

/// Create a linked writer/reader pair for the task `id`.
pub(crate) fn pair<T>(id: TaskId) -> (Promise<T>, TaskFuture<T>) {
    let shared = Arc::new(Shared {
        id,
        slot: Mutex::new(Slot {
            outcome: Outcome::Pending,
            listeners: Vec::new(),
        }),
    });
    let promise = Promise {
        shared: Some(Arc::clone(&shared)),
    };
    (promise, TaskFuture { shared })
}

/// Writer side of a [`TaskFuture`].
///
/// Every settle method consumes the promise. Dropping an unsettled promise
/// settles the future as cancelled, so no future is left pending once its
/// writer is gone.
pub(crate) struct Promise<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Promise<T> {
    pub(crate) fn complete(mut self, value: T) {
        self.settle(Outcome::Completed(value));
    }

    pub(crate) fn fail(mut self, failure: TaskFailure) {
        self.settle(Outcome::Failed(Arc::new(failure)));
    }

    fn settle(&mut self, outcome: Outcome<T>) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        if let Err(err) = shared.settle(outcome) {
            warn!(task_id = %shared.id, %err, "ignoring second settlement");
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        self.settle(Outcome::Cancelled);
    }
}

/// Handle to the eventual outcome of a submitted task.
///
/// Clones observe the same cell. Once terminal, every read returns the same
/// value (cloned) or the same shared failure.
pub struct TaskFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for TaskFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> TaskFuture<T> {
    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn state(&self) -> FutureState {
        lock(&self.shared.slot).outcome.state()
    }

    /// Non-blocking terminal-state check.
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wake `signal` when this future settles (immediately if it already has).
    pub(crate) fn subscribe(&self, signal: &Arc<Signal>) {
        {
            let mut slot = lock(&self.shared.slot);
            if matches!(slot.outcome, Outcome::Pending) {
                // timed-out waiters leave their signals behind
                slot.listeners.retain(|listener| !listener.is_dead());
                slot.listeners.push(Listener::Signal(Arc::downgrade(signal)));
                return;
            }
        }
        signal.notify();
    }

    #[cfg(test)]
    pub(crate) fn settle_for_test(&self, value: T) -> Result<(), AlreadySettled> {
        self.shared.settle(Outcome::Completed(value))
    }
}

impl<T: Clone> TaskFuture<T> {
    /// The outcome if the future is terminal, without blocking.
    pub fn try_get(&self) -> Option<Result<T, ExecError>> {
        lock(&self.shared.slot).outcome.read()
    }

    /// Block until the task settles.
    ///
    /// A failed task yields [`ExecError::Execution`] wrapping its failure.
    pub fn wait(&self) -> Result<T, ExecError> {
        let waiter = Waiter::new();
        self.subscribe(waiter.signal());
        waiter.wait(|| self.try_get())?
    }

    /// Block until the task settles or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, ExecError> {
        let deadline = deadline_after(timeout);
        let waiter = Waiter::new();
        self.subscribe(waiter.signal());
        waiter
            .wait_for(deadline, || self.try_get())?
            .unwrap_or(Err(ExecError::Timeout(timeout)))
    }
}

impl<T: Clone> std::future::Future for TaskFuture<T> {
    type Output = Result<T, ExecError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = lock(&self.shared.slot);
        if let Some(result) = slot.outcome.read() {
            return Poll::Ready(result);
        }
        let registered = slot.listeners.iter().any(|listener| {
            matches!(listener, Listener::Waker(waker) if waker.will_wake(cx.waker()))
        });
        if !registered {
            slot.listeners.push(Listener::Waker(cx.waker().clone()));
        }
        Poll::Pending
    }
}

impl<T> fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn new_pair<T>() -> (Promise<T>, TaskFuture<T>) {
        pair(TaskId::generate())
    }

    #[test]
    fn starts_pending() {
        let (_promise, future) = new_pair::<u32>();
        assert_eq!(future.state(), FutureState::Pending);
        assert!(!future.is_done());
        assert!(future.try_get().is_none());
    }

    #[test]
    fn completed_value_is_read_repeatedly() {
        let (promise, future) = new_pair::<String>();
        promise.complete("OK".to_string());

        assert_eq!(future.state(), FutureState::Completed);
        assert_eq!(future.wait().unwrap(), "OK");
        assert_eq!(future.wait().unwrap(), "OK");
        assert_eq!(future.clone().try_get().unwrap().unwrap(), "OK");
    }

    #[test]
    fn failure_is_shared_across_reads() {
        let (promise, future) = new_pair::<u32>();
        promise.fail(TaskFailure::Error("fail".into()));

        let first = future.wait().unwrap_err();
        let second = future.wait().unwrap_err();
        match (first, second) {
            (ExecError::Execution(a), ExecError::Execution(b)) => {
                assert!(Arc::ptr_eq(&a, &b));
                assert_eq!(a.to_string(), "task failed: fail");
            }
            other => panic!("expected execution failures, got {other:?}"),
        }
    }

    #[test]
    fn second_settlement_is_rejected() {
        let (promise, future) = new_pair::<u32>();
        promise.complete(1);

        assert!(future.settle_for_test(2).is_err());
        assert_eq!(future.wait().unwrap(), 1);
    }

    #[test]
    fn dropped_promise_cancels_future() {
        let (promise, future) = new_pair::<u32>();
        drop(promise);

        assert_eq!(future.state(), FutureState::Cancelled);
        assert!(matches!(future.wait(), Err(ExecError::Cancelled)));
    }

    #[test]
    fn wait_timeout_on_pending_future_times_out() {
        let (_promise, future) = new_pair::<u32>();
        let err = future.wait_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, ExecError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[test]
    fn value_written_on_other_thread_wakes_blocked_reader() {
        let (promise, future) = new_pair::<u64>();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.complete(42);
        });

        assert_eq!(future.wait_timeout(Duration::from_secs(5)).unwrap(), 42);
        writer.join().unwrap();
    }

    #[test]
    fn repeated_timed_out_waits_do_not_accumulate_listeners() {
        let (_promise, future) = new_pair::<u32>();
        for _ in 0..50 {
            let err = future.wait_timeout(Duration::from_millis(1)).unwrap_err();
            assert!(matches!(err, ExecError::Timeout(_)));
        }
        assert!(lock(&future.shared.slot).listeners.len() <= 1);
    }

    #[test]
    fn unbounded_wait_timeout_returns_value() {
        let (promise, future) = new_pair::<u64>();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            promise.complete(7);
        });

        assert_eq!(future.wait_timeout(Duration::MAX).unwrap(), 7);
        writer.join().unwrap();
    }

    #[tokio::test]
    async fn future_can_be_awaited() {
        let (promise, future) = new_pair::<&'static str>();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            promise.complete("A");
        });

        assert_eq!(future.await.unwrap(), "A");
        writer.join().unwrap();
    }
}
