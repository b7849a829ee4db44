//! Resumable transfer of one item's payload.
//!
//! # Overview
//!
//! ```text
//! START -> check local file -> TRANSFERRING -> VERIFYING -> DONE
//!                                   ^              |
//!                                   +--- RETRY <---+--> FAILED
//! ```
//!
//! - An existing file with the same id and quality short-circuits to
//!   `AlreadyExists` unless continue mode is on, in which case a similarly
//!   named file is renamed to the canonical name and resumed.
//! - A partial file is resumed with `Range: bytes=<size>-`.
//! - Each attempt ends in a [`DownloadError`] that is classified by
//!   [`classify_fault`] and handed to the [`RetryPolicy`].
//! - On exhaustion the partial file is deleted only when this run created it
//!   and unfinished files are not kept.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::engine::DownloadStats;
use super::filename::{existing_file_pattern, find_existing_file};
use super::retry::{FaultKind, RetryDecision, RetryPolicy, classify_fault};
use super::throttle::ThrottleMonitor;
use super::{DownloadError, HttpClient};
use crate::config::{DownloadMode, NamingFlags};
use crate::queue::{ItemFlags, ItemOutcome, ItemRecord, ItemState, RunState};

const MB: f64 = 1024.0 * 1024.0;

/// Per-run settings for the transfer state machine.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Destination base folder.
    pub base: PathBuf,
    /// File creation mode.
    pub mode: DownloadMode,
    /// Resume/rename existing files instead of skipping them.
    pub continue_mode: bool,
    /// Never delete unfinished files.
    pub keep_unfinished: bool,
    /// Filename segments in use (for existing-file matching).
    pub naming: NamingFlags,
    /// Filename prefix.
    pub prefix: String,
}

/// How a single successful attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    /// Payload streamed and size verified.
    Completed,
    /// Server reports nothing left to send.
    AlreadyComplete,
}

/// Drives one item from `Active` to a terminal state.
#[derive(Debug, Clone)]
pub struct ResumableTransfer {
    client: HttpClient,
    policy: RetryPolicy,
    throttle: ThrottleMonitor,
    options: Arc<TransferOptions>,
}

impl ResumableTransfer {
    /// Creates a transfer driver shared by all workers.
    #[must_use]
    pub fn new(
        client: HttpClient,
        policy: RetryPolicy,
        throttle: ThrottleMonitor,
        options: TransferOptions,
    ) -> Self {
        Self {
            client,
            policy,
            throttle,
            options: Arc::new(options),
        }
    }

    /// Returns the transfer options.
    #[must_use]
    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Transfers the payload of a classified item.
    ///
    /// Never fails: every fault becomes an [`ItemOutcome`].
    #[instrument(skip_all, fields(item_id = item.id))]
    pub async fn run(
        &self,
        item: &mut ItemRecord,
        state: &RunState,
        interrupt: &CancellationToken,
        stats: &DownloadStats,
    ) -> ItemOutcome {
        item.set_state(ItemState::Active);
        let outcome = self.run_inner(item, state, interrupt, stats).await;
        match &outcome {
            ItemOutcome::Completed | ItemOutcome::AlreadyExists | ItemOutcome::Skipped => {
                item.set_state(ItemState::Done);
            }
            _ => {
                item.set_state(ItemState::Failed);
            }
        }
        outcome
    }

    async fn run_inner(
        &self,
        item: &mut ItemRecord,
        state: &RunState,
        interrupt: &CancellationToken,
        stats: &DownloadStats,
    ) -> ItemOutcome {
        let options = &self.options;
        if options.mode == DownloadMode::Skip {
            debug!("skip mode, no file operation");
            return ItemOutcome::Skipped;
        }

        item.set_state(ItemState::Downloading);
        let (Some(link), Some(path)) = (item.link.clone(), item.full_path(&options.base)) else {
            return ItemOutcome::Failed {
                reason: "item has no link or filename".to_string(),
            };
        };

        let folder = item.folder(&options.base);
        if let Err(e) = tokio::fs::create_dir_all(&folder).await {
            error!(folder = %folder.display(), error = %e, "unable to create destination folder");
            return ItemOutcome::Failed {
                reason: format!("unable to create folder {}: {e}", folder.display()),
            };
        }

        if let Some(outcome) = self.check_existing(item, &path).await {
            return outcome;
        }

        let mut failures = 0u32;
        loop {
            let existing = tokio::fs::metadata(&path).await.ok().filter(|m| m.is_file());
            let file_size = existing.as_ref().map_or(0, std::fs::Metadata::len);
            if existing.is_some() && failures == 0 {
                item.set_flag(ItemFlags::ALREADY_EXISTED_EXACT);
            }

            if options.mode == DownloadMode::Touch {
                return touch(item, &path, existing.is_some()).await;
            }

            let result = self
                .attempt(item, &link, &path, file_size, state, interrupt, stats)
                .await;
            let error = match result {
                Ok(AttemptOutcome::Completed) => return ItemOutcome::Completed,
                Ok(AttemptOutcome::AlreadyComplete) => {
                    warn!(path = %path.display(), size = file_size, "already completed");
                    return ItemOutcome::AlreadyExists;
                }
                Err(e) => e,
            };

            let kind = classify_fault(&error);
            match kind {
                FaultKind::NotFound => {
                    error!(url = %link, "got 404 for payload");
                    return ItemOutcome::NotFound;
                }
                FaultKind::Interrupted => {
                    debug!("transfer interrupted");
                    return ItemOutcome::Failed {
                        reason: "interrupted".to_string(),
                    };
                }
                FaultKind::Transient | FaultKind::Local => {}
            }

            failures += 1;
            error!(failures, error = %error, "transfer attempt failed");
            match self.policy.should_retry(kind, failures) {
                RetryDecision::Retry { delay, attempt } => {
                    stats.increment_retried();
                    item.set_state(ItemState::Downloading);
                    debug!(attempt, delay_ms = delay.as_millis(), "retrying transfer");
                    tokio::select! {
                        () = interrupt.cancelled() => {
                            return ItemOutcome::Failed { reason: "interrupted".to_string() };
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    self.discard_unfinished(item, &path).await;
                    return if kind == FaultKind::Local {
                        ItemOutcome::Failed {
                            reason: error.to_string(),
                        }
                    } else {
                        warn!(%reason, "giving up on transfer");
                        ItemOutcome::RetriesExhausted
                    };
                }
            }
        }
    }

    /// Looks for a stored file of the same id and quality.
    ///
    /// Returns `Some(AlreadyExists)` when the transfer must be skipped.
    async fn check_existing(&self, item: &mut ItemRecord, path: &Path) -> Option<ItemOutcome> {
        let options = &self.options;
        let pattern =
            match existing_file_pattern(item.id, &item.quality, options.naming, &options.prefix) {
                Ok(pattern) => pattern,
                Err(e) => {
                    warn!(error = %e, "cannot build existing-file pattern");
                    return None;
                }
            };

        let base = options.base.clone();
        let preferred = path.to_path_buf();
        let found = tokio::task::spawn_blocking(move || find_existing_file(&base, &pattern, &preferred))
            .await
            .ok()
            .flatten()?;

        let exact = found == path;
        item.set_flag(if exact {
            ItemFlags::ALREADY_EXISTED_EXACT
        } else {
            ItemFlags::ALREADY_EXISTED_SIMILAR
        });

        if !options.continue_mode {
            info!(path = %found.display(), "file (or similar) already exists, skipped");
            return Some(ItemOutcome::AlreadyExists);
        }
        if !exact {
            if tokio::fs::metadata(path).await.is_ok() {
                warn!(path = %path.display(), old = %found.display(), "target name taken, old file preserved");
            } else if let Err(e) = tokio::fs::rename(&found, path).await {
                warn!(old = %found.display(), error = %e, "unable to enforce new name, old file preserved");
            } else {
                info!(old = %found.display(), new = %path.display(), "similar file found, enforcing new name");
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        item: &mut ItemRecord,
        link: &str,
        path: &Path,
        file_size: u64,
        state: &RunState,
        interrupt: &CancellationToken,
        stats: &DownloadStats,
    ) -> Result<AttemptOutcome, DownloadError> {
        let response = tokio::select! {
            () = interrupt.cancelled() => return Err(DownloadError::interrupted(link)),
            response = self.client.get_from(link, file_size) => response?,
        };

        let status = response.status().as_u16();
        let declared_len = response.content_length();
        let remote_total = content_range_total(&response).unwrap_or(1);
        if (declared_len == Some(0) || status == 416) && file_size >= remote_total {
            return Ok(AttemptOutcome::AlreadyComplete);
        }
        if !response.status().is_success() {
            return Err(DownloadError::http_status(link, status));
        }
        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|ct| ct.contains("text"))
        {
            return Err(DownloadError::textual_payload(link, content_type));
        }

        // a plain 200 means the range was ignored; start over
        let restart = file_size > 0 && status != 206;
        let offset = if restart { 0 } else { file_size };
        let content_len = declared_len.unwrap_or(0);
        item.expected_size = offset + content_len;
        if restart {
            warn!(path = %path.display(), "server ignored range request, restarting from zero");
        }
        #[allow(clippy::cast_precision_loss)]
        let megabytes = content_len as f64 / MB;
        info!(
            path = %path.display(),
            offset,
            size_mb = format!("{megabytes:.2}"),
            "saving"
        );

        let existed = tokio::fs::metadata(path).await.is_ok();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!restart)
            .truncate(restart)
            .open(path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        // a truncated file holds only bytes from this run
        if !existed || restart {
            item.set_flag(ItemFlags::FILE_WAS_CREATED);
        }

        state.begin_writing(path);
        item.set_state(ItemState::Writing);

        let progress = Arc::new(AtomicU64::new(0));
        let abort = CancellationToken::new();
        let guard = self.throttle.watch(Arc::clone(&progress), abort.clone());
        let streamed = stream_to_file(file, response, link, path, &progress, interrupt, &abort).await;
        drop(guard);
        stats.add_bytes(progress.load(Ordering::Relaxed));

        match streamed {
            // leave the path registered so the interrupt sweep can remove it
            Err(DownloadError::Interrupted { url }) => {
                return Err(DownloadError::Interrupted { url });
            }
            Err(DownloadError::Throttled { url, .. }) => {
                state.end_writing(path);
                return Err(DownloadError::throttled(url, self.throttle.floor()));
            }
            other => {
                state.end_writing(path);
                other?;
            }
        }

        let final_size = tokio::fs::metadata(path)
            .await
            .map_err(|e| DownloadError::io(path, e))?
            .len();
        if content_len > 0 && final_size != item.expected_size {
            return Err(DownloadError::integrity(path, item.expected_size, final_size));
        }

        info!(path = %path.display(), bytes = final_size, "transfer complete");
        Ok(AttemptOutcome::Completed)
    }

    /// Deletes the partial file if this run created it and unfinished files
    /// are not kept.
    async fn discard_unfinished(&self, item: &ItemRecord, path: &Path) {
        if self.options.keep_unfinished || !item.has_flag(ItemFlags::FILE_WAS_CREATED) {
            return;
        }
        if tokio::fs::metadata(path).await.is_ok() {
            error!(path = %path.display(), "failed to download, removing unfinished file");
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "unable to remove unfinished file");
            }
        }
    }
}

/// Ensures a zero-byte placeholder exists; no network I/O.
async fn touch(item: &mut ItemRecord, path: &Path, exists: bool) -> ItemOutcome {
    if exists {
        info!(path = %path.display(), "already exists");
        return ItemOutcome::AlreadyExists;
    }
    match File::create(path).await {
        Ok(_) => {
            item.set_flag(ItemFlags::FILE_WAS_CREATED);
            info!(path = %path.display(), "saved placeholder");
            ItemOutcome::Completed
        }
        Err(e) => ItemOutcome::Failed {
            reason: format!("unable to create {}: {e}", path.display()),
        },
    }
}

/// Parses the total from `Content-Range: bytes a-b/<total>`.
fn content_range_total(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit_once('/')?
        .1
        .trim()
        .parse()
        .ok()
}

/// Streams the response body to file, returning bytes written.
///
/// Stops early when `interrupt` or `abort` fires, flushing what was received
/// so the next attempt resumes from it.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    progress: &AtomicU64,
    interrupt: &CancellationToken,
    abort: &CancellationToken,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = interrupt.cancelled() => {
                let _ = writer.flush().await;
                return Err(DownloadError::interrupted(url));
            }
            () = abort.cancelled() => {
                let _ = writer.flush().await;
                return Err(DownloadError::throttled(url, 0));
            }
            next = stream.next() => next,
        };
        let Some(chunk_result) = next else {
            break;
        };
        let chunk = chunk_result.map_err(|e| DownloadError::from_request(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;
        progress.fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }

    // Ensure all data is flushed to disk
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}
