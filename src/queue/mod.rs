//! In-memory backlog and shared run-state sets.
//!
//! A run operates over a single in-memory backlog of item records; nothing
//! is persisted across runs.
//!
//! # Overview
//!
//! - [`Backlog`] - FIFO of not-yet-dispatched [`ItemRecord`]s
//! - [`RunState`] - concurrent `in_flight` / `writing` / `failed` / `not_found` sets
//! - [`ItemRecord`], [`ItemState`], [`ItemFlags`], [`ItemOutcome`] - per-item state
//!
//! # Example
//!
//! ```
//! use idfetch_core::queue::{Backlog, RunState};
//!
//! let backlog = Backlog::from_ids([1, 2, 3], "360p");
//! let state = RunState::new();
//!
//! let item = backlog.pop().unwrap();
//! assert!(state.try_claim(item.id));
//! assert_eq!(state.active_count(), 1);
//! state.release(item.id);
//! assert_eq!(backlog.len(), 2);
//! ```

mod item;

pub use item::{ItemFlags, ItemId, ItemOutcome, ItemRecord, ItemState};

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use dashmap::DashSet;
use tracing::debug;

/// Ordered sequence of items not yet dispatched to a worker.
///
/// Records move out of the backlog by value, so an id can never sit in the
/// backlog and in a worker at the same time.
#[derive(Debug, Default)]
pub struct Backlog {
    items: Mutex<VecDeque<ItemRecord>>,
}

impl Backlog {
    /// Creates a backlog with one `New` record per id, in the given order.
    ///
    /// Duplicate ids are dropped, keeping the first occurrence.
    #[must_use]
    pub fn from_ids(ids: impl IntoIterator<Item = ItemId>, quality: &str) -> Self {
        let mut seen = std::collections::HashSet::new();
        let items = ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .map(|id| ItemRecord::new(id, quality))
            .collect();
        Self {
            items: Mutex::new(items),
        }
    }

    /// Removes and returns the next record, if any.
    pub fn pop(&self) -> Option<ItemRecord> {
        self.lock().pop_front()
    }

    /// Number of records still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no record is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Puts undispatched records back at the front, keeping their order.
    pub fn restore(&self, records: impl IntoIterator<Item = ItemRecord>) {
        let mut items = self.lock();
        let restored: Vec<ItemRecord> = records.into_iter().collect();
        for record in restored.into_iter().rev() {
            items.push_front(record);
        }
    }

    /// Ids still waiting, in dispatch order.
    #[must_use]
    pub fn ids(&self) -> Vec<ItemId> {
        self.lock().iter().map(|item| item.id).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ItemRecord>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared sets tracked across workers for the lifetime of a run.
///
/// Each set is a concurrent collection; workers run on a multi-threaded
/// runtime and mutate them without an outer lock.
#[derive(Debug, Default)]
pub struct RunState {
    in_flight: DashSet<ItemId>,
    writing: DashSet<PathBuf>,
    failed: DashSet<ItemId>,
    not_found: DashSet<ItemId>,
}

impl RunState {
    /// Creates empty run state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as owned by a worker. Returns false if it was already in flight.
    pub fn try_claim(&self, id: ItemId) -> bool {
        self.in_flight.insert(id)
    }

    /// Releases worker ownership of `id`.
    pub fn release(&self, id: ItemId) {
        self.in_flight.remove(&id);
    }

    /// Number of items currently owned by workers.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Registers `path` as currently being written.
    pub fn begin_writing(&self, path: &Path) {
        self.writing.insert(path.to_path_buf());
    }

    /// Removes `path` from the writing set.
    pub fn end_writing(&self, path: &Path) {
        self.writing.remove(path);
    }

    /// Returns true if `path` is currently being written.
    #[must_use]
    pub fn is_writing(&self, path: &Path) -> bool {
        self.writing.contains(path)
    }

    /// Number of destination paths currently being written.
    #[must_use]
    pub fn writing_count(&self) -> usize {
        self.writing.len()
    }

    /// Removes and returns every path in the writing set.
    pub fn take_writing(&self) -> Vec<PathBuf> {
        let paths: Vec<PathBuf> = self.writing.iter().map(|p| p.key().clone()).collect();
        for path in &paths {
            self.writing.remove(path);
        }
        paths
    }

    /// Records the terminal outcome of `id` into the matching report set.
    pub fn record_outcome(&self, id: ItemId, outcome: &ItemOutcome) {
        if outcome.is_failure() {
            debug!(item_id = id, %outcome, "recording failed item");
            self.failed.insert(id);
        } else if *outcome == ItemOutcome::NotFound {
            self.not_found.insert(id);
        }
    }

    /// Sorted ids that exhausted retries or hit unrecoverable errors.
    #[must_use]
    pub fn failed_sorted(&self) -> Vec<ItemId> {
        sorted(&self.failed)
    }

    /// Sorted ids that do not exist remotely.
    #[must_use]
    pub fn not_found_sorted(&self) -> Vec<ItemId> {
        sorted(&self.not_found)
    }
}

fn sorted(set: &DashSet<ItemId>) -> Vec<ItemId> {
    let mut ids: Vec<ItemId> = set.iter().map(|id| *id).collect();
    ids.sort_unstable();
    ids
}
