use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FutureState, ServiceState};

/// Point-in-time view of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub state: ServiceState,
    pub queued: usize,
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
    pub started_at: DateTime<Utc>,
}

/// Running totals updated by submitters and the worker.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    pub(crate) fn record_submitted(&self, n: usize) {
        self.submitted.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self, n: usize) {
        self.rejected.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Count a task the worker finished running.
    pub(crate) fn record_finished(&self, state: FutureState) {
        match state {
            FutureState::Completed => self.succeeded.fetch_add(1, Ordering::Relaxed),
            FutureState::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
            FutureState::Pending | FutureState::Cancelled => return,
        };
    }

    pub(crate) fn snapshot(
        &self,
        state: ServiceState,
        queued: usize,
        started_at: DateTime<Utc>,
    ) -> ServiceStats {
        ServiceStats {
            state,
            queued,
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let counters = Counters::default();
        counters.record_submitted(3);
        counters.record_rejected(1);
        counters.record_finished(FutureState::Completed);
        counters.record_finished(FutureState::Failed);
        counters.record_finished(FutureState::Cancelled);

        let now = Utc::now();
        let stats = counters.snapshot(ServiceState::Accepting, 1, now);
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.started_at, now);
    }

    #[test]
    fn stats_serialize_to_json() {
        let stats = Counters::default().snapshot(ServiceState::Draining, 0, Utc::now());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["state"], "draining");
        assert_eq!(json["submitted"], 0);
    }
}
