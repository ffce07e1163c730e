//! Task record: a task bound to the promise it must settle.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::{FutureState, TaskId};
use crate::error::{TaskFailure, TaskResult};
use crate::future::{self, Promise, TaskFuture};

type Job = Box<dyn FnOnce() -> FutureState + Send>;

/// One queued unit of work.
///
/// Design:
/// - Created by submission, never mutated afterwards.
/// - Consumed exactly once: run by the worker, or handed back by
///   `shutdown_now` as a [`PendingTask`].
/// - The task's result type is erased here so one queue holds every task.
///   Dropping a record without running it cancels its future.
pub struct TaskRecord {
    id: TaskId,
    submitted_at: DateTime<Utc>,
    job: Job,
}

impl TaskRecord {
    pub(crate) fn new<T, F>(task: F) -> (Self, TaskFuture<T>)
    where
        T: Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
    {
        let id = TaskId::generate();
        let (promise, future) = future::pair(id);
        let record = Self {
            id,
            submitted_at: Utc::now(),
            job: Box::new(move || run_task(id, task, promise)),
        };
        (record, future)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Run the task on the calling thread and settle its future.
    ///
    /// Returns the state the future settled in.
    pub(crate) fn run(self) -> FutureState {
        (self.job)()
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}

/// Runs the task, capturing both returned errors and panics into the promise.
fn run_task<T, F>(id: TaskId, task: F, promise: Promise<T>) -> FutureState
where
    F: FnOnce() -> TaskResult<T>,
{
    let failure = match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(value)) => {
            promise.complete(value);
            return FutureState::Completed;
        }
        Ok(Err(err)) => TaskFailure::Error(err),
        Err(payload) => TaskFailure::Panicked(panic_message(payload.as_ref())),
    };
    warn!(task_id = %id, error = %failure, "task failed");
    promise.fail(failure);
    FutureState::Failed
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A task that was queued but never started when the service was stopped
/// with `shutdown_now`.
///
/// Its future stays pending while this wrapper is held. [`run`](Self::run)
/// executes the task on the calling thread and settles the future; dropping
/// the wrapper without running it settles the future as cancelled.
#[derive(Debug)]
pub struct PendingTask {
    record: TaskRecord,
}

impl PendingTask {
    pub(crate) fn new(record: TaskRecord) -> Self {
        Self { record }
    }

    pub fn id(&self) -> TaskId {
        self.record.id()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.record.submitted_at()
    }

    pub fn run(self) -> FutureState {
        self.record.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecError;

    #[test]
    fn run_completes_future_with_value() {
        let (record, future) = TaskRecord::new(|| Ok("OK"));
        assert_eq!(record.id(), future.id());

        assert_eq!(record.run(), FutureState::Completed);
        assert_eq!(future.wait().unwrap(), "OK");
    }

    #[test]
    fn returned_error_is_captured() {
        let (record, future) = TaskRecord::new(|| -> TaskResult<u32> { Err("fail".into()) });

        assert_eq!(record.run(), FutureState::Failed);
        let err = future.wait().unwrap_err();
        assert!(matches!(err.task_failure(), Some(TaskFailure::Error(e)) if e.to_string() == "fail"));
    }

    #[test]
    fn panic_is_captured() {
        let (record, future) = TaskRecord::new(|| -> TaskResult<u32> { panic!("kaboom") });

        assert_eq!(record.run(), FutureState::Failed);
        let err = future.wait().unwrap_err();
        assert!(matches!(err.task_failure(), Some(TaskFailure::Panicked(m)) if m == "kaboom"));
    }

    #[test]
    fn dropped_record_cancels_future() {
        let (record, future) = TaskRecord::new(|| Ok(1));
        drop(record);
        assert!(matches!(future.wait(), Err(ExecError::Cancelled)));
    }

    #[test]
    fn pending_task_runs_on_caller_thread() {
        let (record, future) = TaskRecord::new(|| Ok(std::thread::current().id()));
        let pending = PendingTask::new(record);
        assert_eq!(pending.id(), future.id());
        assert_eq!(future.state(), FutureState::Pending);

        assert_eq!(pending.run(), FutureState::Completed);
        assert_eq!(future.wait().unwrap(), std::thread::current().id());
    }
}
