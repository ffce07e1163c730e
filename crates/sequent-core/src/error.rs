use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::domain::ServiceState;

/// Error produced by a task body.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a task returns.
pub type TaskResult<T> = Result<T, TaskError>;

/// A failure captured from a task while the worker ran it.
///
/// Never escapes the worker loop: it is stored in the task's future and only
/// surfaces (wrapped in [`ExecError::Execution`]) when that future is read.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("task failed: {0}")]
    Error(TaskError),

    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Raised when a future cell is settled twice.
#[derive(Debug, Error)]
#[error("future is already settled")]
pub struct AlreadySettled;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("task rejected: service is {state}")]
    Rejected { state: ServiceState },

    #[error("task execution failed")]
    Execution(#[source] Arc<TaskFailure>),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("wait was interrupted")]
    Interrupted,

    #[error("task was cancelled before it ran")]
    Cancelled,

    #[error("invoke_any requires at least one task")]
    EmptyBatch,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("invalid service config: {0}")]
    Config(#[from] serde_json::Error),
}

impl ExecError {
    /// The captured task failure, if this error wraps one.
    pub fn task_failure(&self) -> Option<&TaskFailure> {
        match self {
            ExecError::Execution(failure) => Some(failure.as_ref()),
            _ => None,
        }
    }
}
