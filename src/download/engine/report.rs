//! Progress snapshots and the final run report.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::{error, info, warn};

use crate::queue::{ItemId, ItemRecord};

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    /// Ids not yet handed to the queue.
    pub backlog: usize,
    /// Prepared jobs waiting for a worker.
    pub queued: usize,
    /// Items owned by a worker.
    pub active: usize,
    /// Files currently being written.
    pub writing: usize,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[queue] backlog: {}, queued: {}, active: {}, writing: {}",
            self.backlog, self.queued, self.active, self.writing
        )
    }
}

/// Records snapshots, keeping only those that differ from the previous one.
#[derive(Debug, Default)]
pub(crate) struct SnapshotLog {
    history: Mutex<Vec<Snapshot>>,
}

impl SnapshotLog {
    /// Logs and stores `snapshot` if it changed. Returns true when stored.
    pub(crate) fn record(&self, snapshot: Snapshot) -> bool {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.last() == Some(&snapshot) {
            return false;
        }
        info!("{snapshot}");
        history.push(snapshot);
        true
    }

    pub(crate) fn take(&self) -> Vec<Snapshot> {
        std::mem::take(&mut *self.history.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Items fully transferred (or touched).
    pub completed: usize,
    /// Items already present on disk.
    pub already_exists: usize,
    /// Items rejected by tag/score/scenario rules.
    pub filtered: usize,
    /// Items skipped by mode or by an unavailable payload.
    pub skipped: usize,
    /// Items that do not exist remotely.
    pub not_found: usize,
    /// Items that failed.
    pub failed: usize,
    /// Transfer retries performed.
    pub retried: usize,
    /// Payload bytes written this run.
    pub bytes: u64,
    /// Failed ids, sorted.
    pub failed_ids: Vec<ItemId>,
    /// Not-found ids, sorted.
    pub not_found_ids: Vec<ItemId>,
    /// Ids never dispatched.
    pub residual_backlog: usize,
    /// Paths still registered as being written.
    pub residual_writing: usize,
    /// The run was interrupted.
    pub interrupted: bool,
    /// Every distinct snapshot emitted by the reporter, in order.
    pub snapshots: Vec<Snapshot>,
    /// Processed items, sorted by id.
    pub items: Vec<ItemRecord>,
}

impl RunReport {
    /// Returns the processed record for `id`.
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&ItemRecord> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Returns the last emitted snapshot.
    #[must_use]
    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.snapshots.last().copied()
    }

    /// Returns true if the engine left work behind without being interrupted.
    #[must_use]
    pub fn has_anomaly(&self) -> bool {
        !self.interrupted && (self.residual_backlog > 0 || self.residual_writing > 0)
    }

    /// Logs the summary: counts, then failed and not-found ids.
    pub fn log_summary(&self) {
        info!(
            completed = self.completed,
            already_exists = self.already_exists,
            filtered = self.filtered,
            skipped = self.skipped,
            not_found = self.not_found,
            failed = self.failed,
            retried = self.retried,
            bytes = self.bytes,
            "run finished"
        );
        if !self.not_found_ids.is_empty() {
            info!("{} not found: {}", self.not_found_ids.len(), join_ids(&self.not_found_ids));
        }
        if self.failed_ids.is_empty() {
            info!("no failed items");
        } else {
            warn!("{} failed: {}", self.failed_ids.len(), join_ids(&self.failed_ids));
        }
        if self.has_anomaly() {
            error!(
                backlog = self.residual_backlog,
                writing = self.residual_writing,
                "engine finished with unprocessed work"
            );
        }
    }
}

fn join_ids(ids: &[ItemId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_log_skips_unchanged() {
        let log = SnapshotLog::default();
        let a = Snapshot {
            backlog: 3,
            ..Snapshot::default()
        };
        assert!(log.record(a));
        assert!(!log.record(a));
        assert!(log.record(Snapshot::default()));
        assert_eq!(log.take(), vec![a, Snapshot::default()]);
        assert!(log.take().is_empty());
    }

    #[test]
    fn test_anomaly_ignored_when_interrupted() {
        let mut report = RunReport {
            residual_backlog: 2,
            ..RunReport::default()
        };
        assert!(report.has_anomaly());
        report.interrupted = true;
        assert!(!report.has_anomaly());
    }

    #[test]
    fn test_join_ids() {
        assert_eq!(join_ids(&[1, 5, 9]), "1, 5, 9");
        assert_eq!(join_ids(&[]), "");
    }
}
