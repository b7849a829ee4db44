//! Download scheduler: bounded producer/consumer over a backlog of ids.
//!
//! # Overview
//!
//! ```text
//! Backlog --producer--> bounded queue --N workers--> scan --> transfer
//!                                                      |
//!                          reporter (snapshots) <------+
//! ```
//!
//! - The producer pops ids from the [`Backlog`] and sends them into a bounded
//!   channel; a full channel suspends it (backpressure).
//! - Each worker receives one item, claims its id in the [`RunState`], runs
//!   the scan stage (resolve, classify, filename) and then the
//!   [`ResumableTransfer`], records the outcome, releases the id and repeats.
//! - The reporter emits a [`Snapshot`] whenever backlog, queue, active or
//!   writing counts change.
//! - Cancelling the interrupt token stops the producer, aborts in-flight
//!   transfers and sweeps the writing set. Records never handed to a worker
//!   go back into the backlog, so `residual_backlog` counts them.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use idfetch_core::download::{
//!     ClientSettings, DownloadEngine, EngineOptions, HttpClient, ResumableTransfer, RetryPolicy,
//!     ThrottleMonitor, TransferOptions,
//! };
//! use idfetch_core::queue::Backlog;
//! use idfetch_core::resolver::HttpMetadataResolver;
//! use idfetch_core::scenario::Classifier;
//!
//! # async fn example(
//! #     classifier: Classifier,
//! #     options: TransferOptions,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let settings = ClientSettings::default();
//! let resolver = HttpMetadataResolver::new("https://meta.example.com/{id}", &settings)?;
//! let transfer = ResumableTransfer::new(
//!     HttpClient::new(&settings)?,
//!     RetryPolicy::default(),
//!     ThrottleMonitor::disabled(),
//!     options,
//! );
//! let engine = DownloadEngine::new(EngineOptions::default(), Arc::new(resolver), classifier, transfer)?;
//! let report = engine.run(Backlog::from_ids([1, 2, 3], "360p")).await;
//! report.log_summary();
//! # Ok(())
//! # }
//! ```

mod report;
mod scan;

pub use report::{RunReport, Snapshot};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use self::report::SnapshotLog;
use self::scan::{NoPayloadRetry, scan_item};
use super::constants::{DEFAULT_QUEUE_CAPACITY, NO_PAYLOAD_RETRIES};
use super::transfer::ResumableTransfer;
use crate::queue::{Backlog, ItemOutcome, ItemRecord, RunState};
use crate::resolver::Resolver;
use crate::scenario::Classifier;

/// Minimum allowed concurrency / queue capacity.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency / queue capacity.
const MAX_CONCURRENCY: usize = 100;

/// Default worker concurrency (equal to the queue capacity).
pub const DEFAULT_CONCURRENCY: usize = DEFAULT_QUEUE_CAPACITY;

/// Error type for download engine construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Invalid queue capacity provided.
    #[error(
        "invalid queue capacity {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidQueueCapacity {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Statistics from a run.
///
/// Uses atomic counters for updates from concurrent workers.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    already_exists: AtomicUsize,
    filtered: AtomicUsize,
    skipped: AtomicUsize,
    not_found: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    bytes: AtomicU64,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of completed items.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of items that already existed.
    #[must_use]
    pub fn already_exists(&self) -> usize {
        self.already_exists.load(Ordering::SeqCst)
    }

    /// Returns the number of filtered items.
    #[must_use]
    pub fn filtered(&self) -> usize {
        self.filtered.load(Ordering::SeqCst)
    }

    /// Returns the number of skipped items.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Returns the number of not-found items.
    #[must_use]
    pub fn not_found(&self) -> usize {
        self.not_found.load(Ordering::SeqCst)
    }

    /// Returns the number of failed items.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of transfer retries.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Returns the payload bytes written.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Returns the number of items with a recorded outcome.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed()
            + self.already_exists()
            + self.filtered()
            + self.skipped()
            + self.not_found()
            + self.failed()
    }

    /// Counts one terminal outcome.
    pub fn record(&self, outcome: &ItemOutcome) {
        let counter = match outcome {
            ItemOutcome::Completed => &self.completed,
            ItemOutcome::AlreadyExists => &self.already_exists,
            ItemOutcome::FilteredOut => &self.filtered,
            ItemOutcome::Skipped => &self.skipped,
            ItemOutcome::NotFound => &self.not_found,
            ItemOutcome::RetriesExhausted | ItemOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Increments the retried counter.
    pub(crate) fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    /// Adds transferred payload bytes.
    pub(crate) fn add_bytes(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Worker count (1-100).
    pub concurrency: usize,
    /// Prepared-job queue capacity (1-100).
    pub queue_capacity: usize,
    /// Scale of the per-job politeness delay; 0 disables it.
    pub politeness: f64,
    /// Reporter sampling interval.
    pub report_interval: Duration,
    /// Re-resolution attempts for items with no payload yet.
    pub no_payload_retries: u32,
    /// Wait between re-resolution attempts.
    pub no_payload_delay: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            politeness: 1.0,
            report_interval: Duration::from_secs(1),
            no_payload_retries: NO_PAYLOAD_RETRIES,
            no_payload_delay: Duration::from_secs(1),
        }
    }
}

/// State shared by the producer, workers and reporter of one engine.
struct Shared {
    resolver: Arc<dyn Resolver>,
    classifier: Classifier,
    transfer: ResumableTransfer,
    state: Arc<RunState>,
    stats: DownloadStats,
    interrupt: CancellationToken,
    options: EngineOptions,
}

/// Bounded-concurrency scheduler for one run.
pub struct DownloadEngine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("resolver", &self.shared.resolver.name())
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if concurrency or queue capacity is outside 1-100.
    #[instrument(level = "debug", skip(resolver, classifier, transfer))]
    pub fn new(
        options: EngineOptions,
        resolver: Arc<dyn Resolver>,
        classifier: Classifier,
        transfer: ResumableTransfer,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: options.concurrency,
            });
        }
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.queue_capacity) {
            return Err(EngineError::InvalidQueueCapacity {
                value: options.queue_capacity,
            });
        }

        debug!(
            concurrency = options.concurrency,
            queue_capacity = options.queue_capacity,
            resolver = resolver.name(),
            "creating download engine"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                resolver,
                classifier,
                transfer,
                state: Arc::new(RunState::new()),
                stats: DownloadStats::new(),
                interrupt: CancellationToken::new(),
                options,
            }),
        })
    }

    /// Returns the token that interrupts the run when cancelled.
    #[must_use]
    pub fn interrupt_token(&self) -> CancellationToken {
        self.shared.interrupt.clone()
    }

    /// Returns the shared run state.
    #[must_use]
    pub fn state(&self) -> &Arc<RunState> {
        &self.shared.state
    }

    /// Returns the run statistics.
    #[must_use]
    pub fn stats(&self) -> &DownloadStats {
        &self.shared.stats
    }

    /// Processes every id in `backlog` and returns the report.
    ///
    /// Per-item failures never abort the run.
    #[instrument(skip_all, fields(items = backlog.len()))]
    pub async fn run(&self, backlog: Backlog) -> RunReport {
        let shared = &self.shared;
        info!(
            items = backlog.len(),
            concurrency = shared.options.concurrency,
            "starting run"
        );

        let backlog = Arc::new(backlog);
        let queued = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel::<ItemRecord>(shared.options.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let producer = spawn_producer(Arc::clone(shared), Arc::clone(&backlog), Arc::clone(&queued), tx);

        let workers: Vec<JoinHandle<Vec<ItemRecord>>> = (0..shared.options.concurrency)
            .map(|worker| {
                let shared = Arc::clone(shared);
                let rx = Arc::clone(&rx);
                let queued = Arc::clone(&queued);
                tokio::spawn(async move { worker_loop(worker, &shared, &rx, &queued).await })
            })
            .collect();

        let snapshots = Arc::new(SnapshotLog::default());
        let reporter_done = CancellationToken::new();
        let reporter = spawn_reporter(
            Arc::clone(shared),
            Arc::clone(&backlog),
            Arc::clone(&queued),
            Arc::clone(&snapshots),
            reporter_done.clone(),
        );

        if let Err(e) = producer.await {
            error!(error = %e, "producer task failed");
        }
        let mut items = Vec::new();
        for worker in workers {
            match worker.await {
                Ok(processed) => items.extend(processed),
                Err(e) => error!(error = %e, "worker task failed"),
            }
        }
        reporter_done.cancel();
        if let Err(e) = reporter.await {
            error!(error = %e, "reporter task failed");
        }

        let undispatched = drain_channel(&rx).await;
        if !undispatched.is_empty() {
            debug!(count = undispatched.len(), "returning queued items to backlog");
            queued.fetch_sub(undispatched.len(), Ordering::SeqCst);
            backlog.restore(undispatched);
        }

        let interrupted = shared.interrupt.is_cancelled();
        if interrupted {
            warn!("interrupted, cleaning up");
            self.sweep_unfinished().await;
        }

        items.sort_by_key(|item| item.id);
        let stats = &shared.stats;
        RunReport {
            completed: stats.completed(),
            already_exists: stats.already_exists(),
            filtered: stats.filtered(),
            skipped: stats.skipped(),
            not_found: stats.not_found(),
            failed: stats.failed(),
            retried: stats.retried(),
            bytes: stats.bytes(),
            failed_ids: shared.state.failed_sorted(),
            not_found_ids: shared.state.not_found_sorted(),
            residual_backlog: backlog.len(),
            residual_writing: shared.state.writing_count(),
            interrupted,
            snapshots: snapshots.take(),
            items,
        }
    }

    /// Deletes every partial file in the writing set.
    ///
    /// Idempotent: the set is emptied, so a second call does nothing. With
    /// keep-unfinished on, paths are only forgotten. Returns the number of
    /// files removed.
    pub async fn sweep_unfinished(&self) -> usize {
        let paths = self.shared.state.take_writing();
        if paths.is_empty() {
            return 0;
        }
        if self.shared.transfer.options().keep_unfinished {
            info!(count = paths.len(), "keeping unfinished files");
            return 0;
        }

        let mut removed = 0;
        for path in paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    info!(path = %path.display(), "removed unfinished file");
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "unable to remove unfinished file"),
            }
        }
        removed
    }
}

fn spawn_producer(
    shared: Arc<Shared>,
    backlog: Arc<Backlog>,
    queued: Arc<AtomicUsize>,
    tx: mpsc::Sender<ItemRecord>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if shared.interrupt.is_cancelled() {
                break;
            }
            let Some(item) = backlog.pop() else {
                break;
            };
            let permit = tokio::select! {
                () = shared.interrupt.cancelled() => None,
                permit = tx.reserve() => permit.ok(),
            };
            let Some(permit) = permit else {
                backlog.restore([item]);
                break;
            };
            // count before send so a fast worker never decrements below zero
            queued.fetch_add(1, Ordering::SeqCst);
            permit.send(item);
        }
        debug!("producer finished");
    })
}

/// Closes the channel and returns every record no worker received.
async fn drain_channel(rx: &Mutex<mpsc::Receiver<ItemRecord>>) -> Vec<ItemRecord> {
    let mut rx = rx.lock().await;
    rx.close();
    let mut left = Vec::new();
    while let Ok(item) = rx.try_recv() {
        left.push(item);
    }
    left
}

async fn worker_loop(
    worker: usize,
    shared: &Shared,
    rx: &Mutex<mpsc::Receiver<ItemRecord>>,
    queued: &AtomicUsize,
) -> Vec<ItemRecord> {
    let mut processed = Vec::new();
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                () = shared.interrupt.cancelled() => None,
                item = rx.recv() => item,
            }
        };
        let Some(mut item) = next else {
            break;
        };
        queued.fetch_sub(1, Ordering::SeqCst);

        if !shared.state.try_claim(item.id) {
            warn!(item_id = item.id, "item already in flight, dropped");
            continue;
        }
        let outcome = process_item(shared, &mut item).await;
        debug!(worker, item_id = item.id, %outcome, state = %item.state(), "item finished");

        shared.state.record_outcome(item.id, &outcome);
        shared.stats.record(&outcome);
        item.set_outcome(outcome);
        shared.state.release(item.id);
        processed.push(item);
    }
    processed
}

async fn process_item(shared: &Shared, item: &mut ItemRecord) -> ItemOutcome {
    let retry = NoPayloadRetry {
        retries: shared.options.no_payload_retries,
        delay: shared.options.no_payload_delay,
    };
    if let Err(outcome) = scan_item(
        item,
        shared.resolver.as_ref(),
        &shared.classifier,
        shared.transfer.options(),
        retry,
        &shared.interrupt,
    )
    .await
    {
        return outcome;
    }

    let delay = politeness_delay(shared.options.politeness, shared.state.active_count());
    if !delay.is_zero() {
        tokio::select! {
            () = shared.interrupt.cancelled() => {}
            () = tokio::time::sleep(delay) => {}
        }
    }

    shared
        .transfer
        .run(item, &shared.state, &shared.interrupt, &shared.stats)
        .await
}

/// `factor * (1.0 - min(0.9, 0.1 * active))` seconds.
fn politeness_delay(factor: f64, active: usize) -> Duration {
    if factor <= 0.0 {
        return Duration::ZERO;
    }
    #[allow(clippy::cast_precision_loss)]
    let busy = (0.1 * active as f64).min(0.9);
    Duration::from_secs_f64(factor * (1.0 - busy))
}

fn spawn_reporter(
    shared: Arc<Shared>,
    backlog: Arc<Backlog>,
    queued: Arc<AtomicUsize>,
    snapshots: Arc<SnapshotLog>,
    done: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let take = || Snapshot {
            backlog: backlog.len(),
            queued: queued.load(Ordering::SeqCst),
            active: shared.state.active_count(),
            writing: shared.state.writing_count(),
        };
        let mut ticker = tokio::time::interval(shared.options.report_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = done.cancelled() => break,
                _ = ticker.tick() => {
                    snapshots.record(take());
                }
            }
        }
        snapshots.record(take());
    })
}
