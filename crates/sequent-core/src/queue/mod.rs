//! Queue module: the FIFO of task records and the service state gate.

mod record;

pub use record::{PendingTask, TaskRecord};

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};

use crate::domain::ServiceState;
use crate::error::ExecError;
use crate::interrupt::InterruptToken;
use crate::sync::lock;

struct QueueState {
    /// Lifecycle of the owning service.
    state: ServiceState,

    /// Ready queue, in submission order.
    ready: VecDeque<TaskRecord>,
}

/// Unbounded FIFO shared by submitters and the single worker.
///
/// The service state lives under the same lock as the records, so the
/// "is the service accepting?" check and the enqueue are one step, and the
/// worker's "keep going?" decision sees exactly the same state.
pub(crate) struct TaskQueue {
    inner: Mutex<QueueState>,
    available: Condvar,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(QueueState {
                state: ServiceState::Accepting,
                ready: VecDeque::new(),
            }),
            available: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> ServiceState {
        lock(&self.inner).state
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.inner).ready.len()
    }

    /// Enqueue records atomically: all of them, in order, or none.
    ///
    /// Never blocks on capacity.
    pub(crate) fn push_all(&self, records: Vec<TaskRecord>) -> Result<(), ExecError> {
        {
            let mut inner = lock(&self.inner);
            if !inner.state.is_accepting() {
                return Err(ExecError::Rejected { state: inner.state });
            }
            inner.ready.extend(records);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Block until the next record is available.
    ///
    /// Returns `None` when the worker should exit: the service no longer
    /// accepts work and the queue is empty, or `interrupt` was raised.
    pub(crate) fn take(&self, interrupt: &InterruptToken) -> Option<TaskRecord> {
        let mut inner = lock(&self.inner);
        loop {
            if interrupt.is_interrupted() {
                return None;
            }
            if let Some(record) = inner.ready.pop_front() {
                return Some(record);
            }
            if !inner.state.is_accepting() {
                return None;
            }
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Accepting -> Draining. Returns whether the state changed.
    pub(crate) fn begin_drain(&self) -> bool {
        let changed = self.advance(ServiceState::Draining);
        if changed {
            // 空キューで待っている worker を起こして終了判定させる
            self.available.notify_all();
        }
        changed
    }

    /// Force Stopped and hand back every record that never started.
    pub(crate) fn stop_now(&self) -> Vec<TaskRecord> {
        let drained = {
            let mut inner = lock(&self.inner);
            if inner.state.can_advance_to(ServiceState::Stopped) {
                inner.state = ServiceState::Stopped;
            }
            inner.ready.drain(..).collect()
        };
        self.available.notify_all();
        drained
    }

    /// Called by the worker on exit.
    pub(crate) fn mark_stopped(&self) {
        self.advance(ServiceState::Stopped);
    }

    fn advance(&self, next: ServiceState) -> bool {
        let mut inner = lock(&self.inner);
        if inner.state.can_advance_to(next) {
            inner.state = next;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn record(value: u32) -> (TaskRecord, crate::future::TaskFuture<u32>) {
        TaskRecord::new(move || Ok(value))
    }

    #[test]
    fn take_returns_records_in_submission_order() {
        let queue = TaskQueue::new();
        let token = InterruptToken::new();
        let (r1, _) = record(1);
        let (r2, _) = record(2);
        let (id1, id2) = (r1.id(), r2.id());

        queue.push_all(vec![r1]).unwrap();
        queue.push_all(vec![r2]).unwrap();
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.take(&token).unwrap().id(), id1);
        assert_eq!(queue.take(&token).unwrap().id(), id2);
    }

    #[test]
    fn push_is_rejected_after_drain_begins() {
        let queue = TaskQueue::new();
        assert!(queue.begin_drain());
        assert!(!queue.begin_drain());

        let (r, future) = record(1);
        let err = queue.push_all(vec![r]).unwrap_err();
        assert!(matches!(err, ExecError::Rejected { state: ServiceState::Draining }));
        // the rejected record was dropped, so nothing can ever settle it
        assert!(future.is_done());
    }

    #[test]
    fn draining_queue_still_hands_out_queued_records() {
        let queue = TaskQueue::new();
        let token = InterruptToken::new();
        let (r, _) = record(1);
        queue.push_all(vec![r]).unwrap();
        queue.begin_drain();

        assert!(queue.take(&token).is_some());
        assert!(queue.take(&token).is_none());
    }

    #[test]
    fn stop_now_drains_everything() {
        let queue = TaskQueue::new();
        let (r1, _) = record(1);
        let (r2, _) = record(2);
        queue.push_all(vec![r1, r2]).unwrap();

        let drained = queue.stop_now();
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.state(), ServiceState::Stopped);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn state_never_moves_backward() {
        let queue = TaskQueue::new();
        queue.stop_now();
        assert!(!queue.begin_drain());
        assert_eq!(queue.state(), ServiceState::Stopped);
    }

    #[test]
    fn blocked_take_wakes_on_drain() {
        let queue = Arc::new(TaskQueue::new());
        let token = InterruptToken::new();

        let taker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.take(&token).is_none())
        };

        thread::sleep(Duration::from_millis(20));
        queue.begin_drain();
        assert!(taker.join().unwrap());
    }

    #[test]
    fn interrupted_take_returns_none_even_with_records() {
        let queue = TaskQueue::new();
        let token = InterruptToken::new();
        let (r, _) = record(1);
        queue.push_all(vec![r]).unwrap();

        token.interrupt();
        assert!(queue.take(&token).is_none());
        assert_eq!(queue.len(), 1);
    }
}
