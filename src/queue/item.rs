//! Per-item record, lifecycle states and outcome taxonomy.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Remote item identifier, unique within a run.
pub type ItemId = u64;

/// Coarse lifecycle state of an item.
///
/// States only move forward, with two exceptions: retries loop
/// `Writing -> Downloading`, and `Failed` is reachable from `Active`,
/// `Downloading` and `Writing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemState {
    /// Created at backlog construction.
    New,
    /// Metadata resolution in progress.
    Scanning,
    /// Metadata resolved and classified; destination and filename known.
    Scanned,
    /// Owned by a worker, transfer not yet started.
    Active,
    /// Transfer request in progress (or waiting to retry).
    Downloading,
    /// Payload is being written to disk.
    Writing,
    /// Terminal: finished without failure.
    Done,
    /// Terminal: transfer failed.
    Failed,
}

impl ItemState {
    /// Returns the lowercase label used in log output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Scanning => "scanning",
            Self::Scanned => "scanned",
            Self::Active => "active",
            Self::Downloading => "downloading",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns true if moving from `self` to `next` keeps the lifecycle invariants.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Done | Self::Failed, _) => false,
            (Self::Active | Self::Downloading | Self::Writing, Self::Failed) => true,
            (_, Self::Failed) => false,
            (Self::Writing, Self::Downloading) => true,
            (current, next) => next > current,
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Independent boolean facts about an item, combinable with any state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemFlags(u8);

impl ItemFlags {
    /// This run created the destination file from nothing.
    pub const FILE_WAS_CREATED: Self = Self(0x01);
    /// A file with the exact destination name already existed.
    pub const ALREADY_EXISTED_EXACT: Self = Self(0x02);
    /// A file with the same id and quality but another name already existed.
    pub const ALREADY_EXISTED_SIMILAR: Self = Self(0x04);

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets every bit of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Returns true if no flag is set.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Final per-item result of a run.
///
/// Only [`ItemOutcome::RetriesExhausted`] and [`ItemOutcome::Failed`] count as
/// failures; everything else is an expected outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Payload transferred (or placeholder touched) and verified.
    Completed,
    /// A matching file was already present; nothing was transferred.
    AlreadyExists,
    /// Excluded by tag, score or scenario rules.
    FilteredOut,
    /// Intentionally not transferred (skip mode, or payload unavailable with a reason).
    Skipped,
    /// The item does not exist remotely.
    NotFound,
    /// Retry budget exhausted during resolution or transfer.
    RetriesExhausted,
    /// Unrecoverable local error (e.g. destination folder cannot be created).
    Failed {
        /// Human-readable cause.
        reason: String,
    },
}

impl ItemOutcome {
    /// Returns true if the outcome belongs in the failed-items report.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::RetriesExhausted | Self::Failed { .. })
    }

    /// Returns the snake-case label used in log output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::AlreadyExists => "already_exists",
            Self::FilteredOut => "filtered_out",
            Self::Skipped => "skipped",
            Self::NotFound => "not_found",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "failed ({reason})"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Mutable state of one item.
///
/// A record is owned by exactly one component at a time: the backlog, then the
/// worker that dequeued it, then the run report. Ownership moves with the value.
#[derive(Debug, Clone)]
pub struct ItemRecord {
    /// Remote identifier.
    pub id: ItemId,
    /// Title as resolved (may be empty).
    pub title: String,
    /// Selected encoding tier (e.g. `720p`).
    pub quality: String,
    /// Destination partition relative to the base path (may be empty).
    pub subfolder: String,
    /// Normalized tags, sorted and deduplicated.
    pub tags: Vec<String>,
    /// False when tag extraction failed entirely (distinct from zero tags).
    pub tags_extracted: bool,
    /// Score, when known.
    pub score: Option<i64>,
    /// Rating percentage, when known.
    pub rating: Option<u8>,
    /// Resolved transfer URL.
    pub link: Option<String>,
    /// Destination filename, computed once after classification.
    pub filename: Option<String>,
    /// Expected final size of the current transfer attempt in bytes.
    pub expected_size: u64,
    state: ItemState,
    flags: ItemFlags,
    outcome: Option<ItemOutcome>,
}

impl ItemRecord {
    /// Creates a record in the `New` state with the requested quality.
    #[must_use]
    pub fn new(id: ItemId, quality: impl Into<String>) -> Self {
        Self {
            id,
            title: String::new(),
            quality: quality.into(),
            subfolder: String::new(),
            tags: Vec::new(),
            tags_extracted: false,
            score: None,
            rating: None,
            link: None,
            filename: None,
            expected_size: 0,
            state: ItemState::New,
            flags: ItemFlags::default(),
            outcome: None,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ItemState {
        self.state
    }

    /// Moves the record to `next`, refusing transitions that break the lifecycle.
    ///
    /// Re-entering the current state is a no-op. Returns false (and leaves the
    /// state untouched) when the transition is not allowed.
    pub fn set_state(&mut self, next: ItemState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            warn!(
                item_id = self.id,
                from = %self.state,
                to = %next,
                "rejected item state transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    /// Returns the flag set.
    #[must_use]
    pub fn flags(&self) -> ItemFlags {
        self.flags
    }

    /// Returns true if `flag` is set.
    #[must_use]
    pub fn has_flag(&self, flag: ItemFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Sets `flag`.
    pub fn set_flag(&mut self, flag: ItemFlags) {
        self.flags.insert(flag);
    }

    /// Returns the recorded outcome, if the item has finished.
    #[must_use]
    pub fn outcome(&self) -> Option<&ItemOutcome> {
        self.outcome.as_ref()
    }

    /// Records the final outcome.
    pub fn set_outcome(&mut self, outcome: ItemOutcome) {
        self.outcome = Some(outcome);
    }

    /// Replaces the tag list with a sorted, deduplicated copy.
    pub fn set_tags(&mut self, tags: impl IntoIterator<Item = String>) {
        let mut tags: Vec<String> = tags.into_iter().collect();
        tags.sort();
        tags.dedup();
        self.tags = tags;
    }

    /// Destination folder: `<base>/<subfolder>`.
    #[must_use]
    pub fn folder(&self, base: &Path) -> PathBuf {
        if self.subfolder.is_empty() {
            base.to_path_buf()
        } else {
            base.join(&self.subfolder)
        }
    }

    /// Full destination path, once the filename is known.
    #[must_use]
    pub fn full_path(&self, base: &Path) -> Option<PathBuf> {
        self.filename
            .as_ref()
            .map(|filename| self.folder(base).join(filename))
    }

    /// Short label used in log messages (`<prefix><id>`).
    #[must_use]
    pub fn label(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.id)
    }
}
