//! Batch operations: wait for all, or for the first.
//!
//! Both submit the whole batch atomically, then block on the futures'
//! settlement signals. Deadlines are computed once, at call entry.

use std::time::Duration;

use crate::error::{ExecError, TaskResult};
use crate::future::TaskFuture;
use crate::queue::TaskRecord;
use crate::sync::{Waiter, deadline_after};

use super::ExecService;

impl ExecService {
    /// Submit every task and wait until each future is terminal.
    ///
    /// Returns the futures in submission order. Task failures stay inside
    /// their futures; only [`ExecError::Rejected`] and
    /// [`ExecError::Interrupted`] escape.
    pub fn invoke_all<T, F, I>(&self, tasks: I) -> Result<Vec<TaskFuture<T>>, ExecError>
    where
        T: Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
        I: IntoIterator<Item = F>,
    {
        self.invoke_all_within(tasks, None)
    }

    /// Like [`invoke_all`](Self::invoke_all), bounded by one deadline for the
    /// whole batch. Futures still pending at the deadline are returned as-is.
    pub fn invoke_all_timeout<T, F, I>(
        &self,
        tasks: I,
        timeout: Duration,
    ) -> Result<Vec<TaskFuture<T>>, ExecError>
    where
        T: Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
        I: IntoIterator<Item = F>,
    {
        self.invoke_all_within(tasks, Some(timeout))
    }

    /// Submit every task and return the value of the first one to finish.
    ///
    /// If that task failed, its failure is returned as
    /// [`ExecError::Execution`]. The other tasks keep running.
    pub fn invoke_any<T, F, I>(&self, tasks: I) -> Result<T, ExecError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
        I: IntoIterator<Item = F>,
    {
        self.invoke_any_within(tasks, None)
    }

    /// Like [`invoke_any`](Self::invoke_any), failing with
    /// [`ExecError::Timeout`] if nothing finishes within `timeout`.
    pub fn invoke_any_timeout<T, F, I>(&self, tasks: I, timeout: Duration) -> Result<T, ExecError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
        I: IntoIterator<Item = F>,
    {
        self.invoke_any_within(tasks, Some(timeout))
    }

    fn invoke_all_within<T, F, I>(
        &self,
        tasks: I,
        timeout: Option<Duration>,
    ) -> Result<Vec<TaskFuture<T>>, ExecError>
    where
        T: Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
        I: IntoIterator<Item = F>,
    {
        let deadline = timeout.and_then(deadline_after);
        let futures = self.submit_batch(tasks.into_iter().collect())?;

        let waiter = Waiter::new();
        for future in &futures {
            future.subscribe(waiter.signal());
            let settled = waiter.wait_for(deadline, || future.is_done().then_some(()))?;
            if settled.is_none() {
                // deadline 超過: 残りは pending のまま返す
                break;
            }
        }
        Ok(futures)
    }

    fn invoke_any_within<T, F, I>(&self, tasks: I, timeout: Option<Duration>) -> Result<T, ExecError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
        I: IntoIterator<Item = F>,
    {
        let deadline = timeout.and_then(deadline_after);
        let tasks: Vec<F> = tasks.into_iter().collect();
        if tasks.is_empty() {
            return Err(ExecError::EmptyBatch);
        }
        let futures = self.submit_batch(tasks)?;

        let waiter = Waiter::new();
        for future in &futures {
            future.subscribe(waiter.signal());
        }
        // one worker runs tasks in order, so the earliest settled future in
        // submission order is the first one to have finished
        let first = || futures.iter().find_map(TaskFuture::try_get);
        match (timeout, deadline) {
            (Some(timeout), Some(deadline)) => waiter
                .wait_for(Some(deadline), first)?
                .unwrap_or(Err(ExecError::Timeout(timeout))),
            _ => waiter.wait(first)?,
        }
    }

    fn submit_batch<T, F>(&self, tasks: Vec<F>) -> Result<Vec<TaskFuture<T>>, ExecError>
    where
        T: Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
    {
        let (records, futures): (Vec<_>, Vec<_>) = tasks.into_iter().map(TaskRecord::new).unzip();
        self.enqueue(records)?;
        Ok(futures)
    }
}
