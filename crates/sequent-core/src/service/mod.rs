//! Service - 公開エントリポイント
//!
//! Submission, lifecycle (shutdown / shutdown_now / termination) and the
//! batch operations in [`batch`].

mod batch;
pub mod builder;

pub use self::builder::ServiceBuilder;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::ServiceConfig;
use crate::domain::ServiceState;
use crate::error::{ExecError, TaskResult};
use crate::future::TaskFuture;
use crate::observability::{Counters, ServiceStats};
use crate::queue::{PendingTask, TaskQueue, TaskRecord};
use crate::worker::Worker;

/// Single-worker task execution service.
///
/// Tasks run one at a time, in submission order, on one dedicated thread.
/// Every submission returns immediately with a [`TaskFuture`].
///
/// Dropping the service calls [`shutdown`](Self::shutdown): queued work
/// still drains on the (detached) worker thread.
pub struct ExecService {
    queue: Arc<TaskQueue>,
    counters: Arc<Counters>,
    worker: Worker,
    started_at: DateTime<Utc>,
}

impl ExecService {
    /// Start a service with the default config.
    pub fn new() -> Result<Self, ExecError> {
        ServiceBuilder::new().build()
    }

    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    pub(crate) fn start(config: ServiceConfig) -> Result<Self, ExecError> {
        let queue = Arc::new(TaskQueue::new());
        let counters = Arc::new(Counters::default());
        let worker = Worker::spawn(&config, Arc::clone(&queue), Arc::clone(&counters))?;
        info!(worker = %config.worker_name, "service started");

        Ok(Self {
            queue,
            counters,
            worker,
            started_at: Utc::now(),
        })
    }

    pub fn state(&self) -> ServiceState {
        self.queue.state()
    }

    /// Queue a task. Fails with [`ExecError::Rejected`] unless the service is
    /// accepting.
    pub fn submit<T, F>(&self, task: F) -> Result<TaskFuture<T>, ExecError>
    where
        T: Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
    {
        let (record, future) = TaskRecord::new(task);
        self.enqueue(vec![record])?;
        Ok(future)
    }

    /// Queue a runnable; its future settles with `()`.
    pub fn submit_runnable<F>(&self, runnable: F) -> Result<TaskFuture<()>, ExecError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(move || {
            runnable();
            Ok(())
        })
    }

    /// Queue a runnable whose future settles with `result` once it has run.
    pub fn submit_with_result<R, F>(&self, runnable: F, result: R) -> Result<TaskFuture<R>, ExecError>
    where
        R: Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        self.submit(move || {
            runnable();
            Ok(result)
        })
    }

    /// Fire-and-forget [`submit_runnable`](Self::submit_runnable).
    pub fn execute<F>(&self, runnable: F) -> Result<(), ExecError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_runnable(runnable).map(drop)
    }

    /// Stop accepting work. Queued and running tasks still complete; the
    /// worker exits once the queue is empty.
    pub fn shutdown(&self) {
        if self.queue.begin_drain() {
            info!(queued = self.queue.len(), "service draining");
        }
    }

    /// Stop immediately: reject new work, interrupt the worker and return the
    /// tasks that never started, in submission order.
    ///
    /// A running task is not aborted; it only stops early if it checks
    /// [`interrupt::is_interrupted`](crate::interrupt::is_interrupted).
    pub fn shutdown_now(&self) -> Vec<PendingTask> {
        let drained = self.queue.stop_now();
        self.worker.interrupt();
        info!(returned = drained.len(), "service stopped");
        drained.into_iter().map(PendingTask::new).collect()
    }

    pub fn is_shutdown(&self) -> bool {
        !self.state().is_accepting()
    }

    /// Stopped and the worker thread has exited.
    pub fn is_terminated(&self) -> bool {
        self.state() == ServiceState::Stopped && self.worker.exited().is_done()
    }

    /// Block until the worker exits or `timeout` elapses. Returns whether the
    /// worker exited.
    pub fn await_termination(&self, timeout: Duration) -> Result<bool, ExecError> {
        match self.worker.exited().wait_timeout(timeout) {
            Ok(()) | Err(ExecError::Cancelled) => Ok(true),
            Err(ExecError::Timeout(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn stats(&self) -> ServiceStats {
        self.counters
            .snapshot(self.state(), self.queue.len(), self.started_at)
    }

    fn enqueue(&self, records: Vec<TaskRecord>) -> Result<(), ExecError> {
        let n = records.len();
        match self.queue.push_all(records) {
            Ok(()) => {
                self.counters.record_submitted(n);
                Ok(())
            }
            Err(err) => {
                self.counters.record_rejected(n);
                Err(err)
            }
        }
    }
}

impl Drop for ExecService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
