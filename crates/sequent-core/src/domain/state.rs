//! Service and future state machines.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of an [`ExecService`](crate::service::ExecService).
///
/// State transitions:
/// - Accepting -> Draining -> Stopped (`shutdown`, then the queue empties)
/// - Accepting -> Stopped (`shutdown_now`)
///
/// The order of the variants is the order of the lifecycle; a state never
/// moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// New submissions are accepted.
    Accepting,

    /// No new submissions; queued tasks still run.
    Draining,

    /// The worker loop has exited or was told to stop.
    Stopped,
}

impl ServiceState {
    pub fn is_accepting(self) -> bool {
        matches!(self, ServiceState::Accepting)
    }

    /// Can the lifecycle move from `self` to `next`?
    pub fn can_advance_to(self, next: ServiceState) -> bool {
        next > self
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Accepting => "accepting",
            ServiceState::Draining => "draining",
            ServiceState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Value-free view of a future's state.
///
/// Pending -> Completed | Failed | Cancelled, and terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FutureState {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl FutureState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, FutureState::Pending)
    }
}
