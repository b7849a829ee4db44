//! Integration tests for the resumable transfer state machine.
//!
//! These tests drive `ResumableTransfer` against mock HTTP servers: retry
//! ceilings, range resume, completion detection, cleanup and throttling.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use idfetch_core::config::DownloadMode;
use idfetch_core::download::{DownloadStats, ThrottleMonitor, TransferOptions};
use idfetch_core::queue::{ItemFlags, ItemOutcome, ItemState, RunState};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, Request, Respond, ResponseTemplate};

mod support;
use support::fixtures::{scanned_item, spawn_short_body_server, transfer, transfer_options};
use support::socket_guard::start_mock_server_or_skip;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

const BODY: &[u8] = b"0123456789";

/// Fails with HTTP 500 for the first `failures` requests, then serves `BODY`.
struct FlakyResponder {
    failures: usize,
    hits: Arc<AtomicUsize>,
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.hits.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            ResponseTemplate::new(500)
        } else {
            ResponseTemplate::new(200).set_body_bytes(BODY)
        }
    }
}

type FlakyRun = (ItemOutcome, ItemState, usize, Option<Vec<u8>>);

async fn run_flaky(failures: usize, ceiling: u32) -> Option<FlakyRun> {
    let mock_server = start_mock_server_or_skip().await?;
    let hits = Arc::new(AtomicUsize::new(0));
    Mock::given(method("GET"))
        .and(path("/v.mp4"))
        .respond_with(FlakyResponder {
            failures,
            hits: Arc::clone(&hits),
        })
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let transfer = transfer(transfer_options(dir.path()), ceiling, ThrottleMonitor::disabled());
    let mut item = scanned_item(1, &format!("{}/v.mp4", mock_server.uri()));
    let outcome = transfer
        .run(&mut item, &RunState::new(), &CancellationToken::new(), &DownloadStats::new())
        .await;

    let file = std::fs::read(item.full_path(dir.path()).unwrap()).ok();
    Some((outcome, item.state(), hits.load(Ordering::SeqCst), file))
}

// ==================== Retry Ceiling Tests ====================

#[tokio::test]
async fn test_flaky_transport_below_ceiling_completes() {
    let Some((outcome, state, hits, file)) = run_flaky(3, 5).await else {
        return;
    };
    assert_eq!(outcome, ItemOutcome::Completed);
    assert_eq!(state, ItemState::Done);
    assert_eq!(hits, 4);
    assert_eq!(file.as_deref(), Some(BODY));
}

#[tokio::test]
async fn test_flaky_transport_at_ceiling_exhausts() {
    let Some((outcome, state, hits, file)) = run_flaky(5, 5).await else {
        return;
    };
    assert_eq!(outcome, ItemOutcome::RetriesExhausted);
    assert_eq!(state, ItemState::Failed);
    assert_eq!(hits, 5);
    assert!(file.is_none());
}

// ==================== Resume Tests ====================

#[tokio::test]
async fn test_partial_file_resumes_with_range() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/v.mp4"))
        .and(header("range", "bytes=6-"))
        .and(header("accept-encoding", "identity"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 6-10/11")
                .set_body_bytes(b"world".as_slice()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("id_1_360p.mp4"), b"hello ").unwrap();
    let options = TransferOptions {
        continue_mode: true,
        ..transfer_options(dir.path())
    };
    let transfer = transfer(options, 3, ThrottleMonitor::disabled());
    let mut item = scanned_item(1, &format!("{}/v.mp4", mock_server.uri()));
    let outcome = transfer
        .run(&mut item, &RunState::new(), &CancellationToken::new(), &DownloadStats::new())
        .await;

    assert_eq!(outcome, ItemOutcome::Completed);
    assert_eq!(std::fs::read(dir.path().join("id_1_360p.mp4")).unwrap(), b"hello world");
    assert_eq!(item.expected_size, 11);
    assert!(item.has_flag(ItemFlags::ALREADY_EXISTED_EXACT));
    assert!(!item.has_flag(ItemFlags::FILE_WAS_CREATED));
}

#[tokio::test]
async fn test_payload_requested_without_compression() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/v.mp4"))
        .and(header("accept-encoding", "identity"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let transfer = transfer(transfer_options(dir.path()), 3, ThrottleMonitor::disabled());
    let mut item = scanned_item(1, &format!("{}/v.mp4", mock_server.uri()));
    let outcome = transfer
        .run(&mut item, &RunState::new(), &CancellationToken::new(), &DownloadStats::new())
        .await;

    assert_eq!(outcome, ItemOutcome::Completed);
    assert_eq!(std::fs::read(dir.path().join("id_1_360p.mp4")).unwrap(), BODY);
}

#[tokio::test]
async fn test_range_not_satisfiable_with_full_file_is_already_exists() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/v.mp4"))
        .respond_with(ResponseTemplate::new(416).insert_header("content-range", "bytes */11"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("id_1_360p.mp4"), b"hello world").unwrap();
    let options = TransferOptions {
        continue_mode: true,
        ..transfer_options(dir.path())
    };
    let transfer = transfer(options, 3, ThrottleMonitor::disabled());
    let mut item = scanned_item(1, &format!("{}/v.mp4", mock_server.uri()));
    let outcome = transfer
        .run(&mut item, &RunState::new(), &CancellationToken::new(), &DownloadStats::new())
        .await;

    assert_eq!(outcome, ItemOutcome::AlreadyExists);
    assert_eq!(item.state(), ItemState::Done);
}

#[tokio::test]
async fn test_continue_renames_similar_file() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/v.mp4"))
        .respond_with(ResponseTemplate::new(416).insert_header("content-range", "bytes */11"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let old = dir.path().join("id_1_old_title_360p.mp4");
    std::fs::write(&old, b"hello world").unwrap();
    let options = TransferOptions {
        continue_mode: true,
        ..transfer_options(dir.path())
    };
    let transfer = transfer(options, 3, ThrottleMonitor::disabled());
    let mut item = scanned_item(1, &format!("{}/v.mp4", mock_server.uri()));
    let outcome = transfer
        .run(&mut item, &RunState::new(), &CancellationToken::new(), &DownloadStats::new())
        .await;

    assert_eq!(outcome, ItemOutcome::AlreadyExists);
    assert!(item.has_flag(ItemFlags::ALREADY_EXISTED_SIMILAR));
    assert!(!old.exists());
    assert!(dir.path().join("id_1_360p.mp4").exists());
}

#[tokio::test]
async fn test_existing_file_skips_network_without_continue() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("other")).unwrap();
    std::fs::write(dir.path().join("other").join("id_1_some_title_360p.mp4"), b"x").unwrap();
    let transfer = transfer(transfer_options(dir.path()), 3, ThrottleMonitor::disabled());
    let mut item = scanned_item(1, &format!("{}/v.mp4", mock_server.uri()));
    let outcome = transfer
        .run(&mut item, &RunState::new(), &CancellationToken::new(), &DownloadStats::new())
        .await;

    assert_eq!(outcome, ItemOutcome::AlreadyExists);
    assert!(item.has_flag(ItemFlags::ALREADY_EXISTED_SIMILAR));
}

// ==================== Response Classification Tests ====================

#[tokio::test]
async fn test_not_found_is_terminal_without_retry() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/v.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let state = RunState::new();
    let transfer = transfer(transfer_options(dir.path()), 5, ThrottleMonitor::disabled());
    let mut item = scanned_item(1, &format!("{}/v.mp4", mock_server.uri()));
    let outcome = transfer
        .run(&mut item, &state, &CancellationToken::new(), &DownloadStats::new())
        .await;
    state.record_outcome(item.id, &outcome);

    assert_eq!(outcome, ItemOutcome::NotFound);
    assert_eq!(item.state(), ItemState::Failed);
    assert!(state.failed_sorted().is_empty());
    assert_eq!(state.not_found_sorted(), vec![1]);
}

#[tokio::test]
async fn test_textual_payload_is_retried() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/v.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>try later</html>"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let stats = DownloadStats::new();
    let transfer = transfer(transfer_options(dir.path()), 2, ThrottleMonitor::disabled());
    let mut item = scanned_item(1, &format!("{}/v.mp4", mock_server.uri()));
    let outcome = transfer
        .run(&mut item, &RunState::new(), &CancellationToken::new(), &stats)
        .await;

    assert_eq!(outcome, ItemOutcome::RetriesExhausted);
    assert_eq!(stats.retried(), 1);
    assert!(!dir.path().join("id_1_360p.mp4").exists());
}

// ==================== Mode Tests ====================

#[tokio::test]
async fn test_touch_mode_creates_placeholder_without_network() {
    let dir = TempDir::new().unwrap();
    let options = TransferOptions {
        mode: DownloadMode::Touch,
        ..transfer_options(dir.path())
    };
    let transfer = transfer(options, 3, ThrottleMonitor::disabled());

    let mut item = scanned_item(1, "http://127.0.0.1:9/never.mp4");
    let outcome = transfer
        .run(&mut item, &RunState::new(), &CancellationToken::new(), &DownloadStats::new())
        .await;
    assert_eq!(outcome, ItemOutcome::Completed);
    assert!(item.has_flag(ItemFlags::FILE_WAS_CREATED));
    let meta = std::fs::metadata(dir.path().join("id_1_360p.mp4")).unwrap();
    assert_eq!(meta.len(), 0);

    let mut again = scanned_item(1, "http://127.0.0.1:9/never.mp4");
    let outcome = transfer
        .run(&mut again, &RunState::new(), &CancellationToken::new(), &DownloadStats::new())
        .await;
    assert_eq!(outcome, ItemOutcome::AlreadyExists);
}

#[tokio::test]
async fn test_skip_mode_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("dest");
    let options = TransferOptions {
        mode: DownloadMode::Skip,
        ..transfer_options(&base)
    };
    let transfer = transfer(options, 3, ThrottleMonitor::disabled());
    let mut item = scanned_item(1, "http://127.0.0.1:9/never.mp4");
    let outcome = transfer
        .run(&mut item, &RunState::new(), &CancellationToken::new(), &DownloadStats::new())
        .await;

    assert_eq!(outcome, ItemOutcome::Skipped);
    assert!(!outcome.is_failure());
    assert_eq!(item.state(), ItemState::Done);
    assert!(!base.exists());
}

// ==================== Cleanup Tests ====================

#[tokio::test]
async fn test_exhausted_transfer_removes_created_file() {
    let Some((url, hits)) = spawn_short_body_server(100, BODY, Duration::ZERO).await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let state = RunState::new();
    let transfer = transfer(transfer_options(dir.path()), 2, ThrottleMonitor::disabled());
    let mut item = scanned_item(1, &url);
    let outcome = transfer
        .run(&mut item, &state, &CancellationToken::new(), &DownloadStats::new())
        .await;

    assert_eq!(outcome, ItemOutcome::RetriesExhausted);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(item.has_flag(ItemFlags::FILE_WAS_CREATED));
    assert!(!dir.path().join("id_1_360p.mp4").exists());
    assert_eq!(state.writing_count(), 0);
}

#[tokio::test]
async fn test_exhausted_restart_removes_truncated_file() {
    let Some((url, hits)) = spawn_short_body_server(100, BODY, Duration::ZERO).await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let stored = dir.path().join("id_1_360p.mp4");
    std::fs::write(&stored, b"old bytes").unwrap();
    let options = TransferOptions {
        continue_mode: true,
        ..transfer_options(dir.path())
    };
    let state = RunState::new();
    let transfer = transfer(options, 2, ThrottleMonitor::disabled());
    let mut item = scanned_item(1, &url);
    let outcome = transfer
        .run(&mut item, &state, &CancellationToken::new(), &DownloadStats::new())
        .await;

    assert_eq!(outcome, ItemOutcome::RetriesExhausted);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(item.has_flag(ItemFlags::ALREADY_EXISTED_EXACT));
    assert!(item.has_flag(ItemFlags::FILE_WAS_CREATED));
    assert!(!stored.exists());
    assert_eq!(state.writing_count(), 0);
}

#[tokio::test]
async fn test_keep_unfinished_preserves_partial_file() {
    let Some((url, _hits)) = spawn_short_body_server(100, BODY, Duration::ZERO).await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let options = TransferOptions {
        keep_unfinished: true,
        ..transfer_options(dir.path())
    };
    let transfer = transfer(options, 2, ThrottleMonitor::disabled());
    let mut item = scanned_item(1, &url);
    let outcome = transfer
        .run(&mut item, &RunState::new(), &CancellationToken::new(), &DownloadStats::new())
        .await;

    assert_eq!(outcome, ItemOutcome::RetriesExhausted);
    assert!(dir.path().join("id_1_360p.mp4").exists());
}

// ==================== Throttle Tests ====================

#[tokio::test]
async fn test_stalled_transfer_is_dropped_and_retried() {
    let Some((url, hits)) = spawn_short_body_server(1_000_000, b"abc", Duration::from_secs(30)).await
    else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let throttle = ThrottleMonitor::with_timing(1_000_000, Duration::from_millis(20), 2);
    let stats = DownloadStats::new();
    let transfer = transfer(transfer_options(dir.path()), 2, throttle);
    let mut item = scanned_item(1, &url);

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        transfer.run(&mut item, &RunState::new(), &CancellationToken::new(), &stats),
    )
    .await
    .unwrap();

    assert_eq!(outcome, ItemOutcome::RetriesExhausted);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(stats.retried(), 1);
}

// ==================== Interrupt Tests ====================

#[tokio::test]
async fn test_interrupt_leaves_path_for_sweep() {
    let Some((url, _hits)) = spawn_short_body_server(1_000_000, b"abc", Duration::from_secs(30)).await
    else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let state = Arc::new(RunState::new());
    let interrupt = CancellationToken::new();
    let transfer = transfer(transfer_options(dir.path()), 5, ThrottleMonitor::disabled());
    let path = dir.path().join("id_1_360p.mp4");

    let task = {
        let state = Arc::clone(&state);
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            let mut item = scanned_item(1, &url);
            transfer
                .run(&mut item, &state, &interrupt, &DownloadStats::new())
                .await
        })
    };

    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while state.writing_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "transfer never started writing");

    interrupt.cancel();
    let outcome = task.await.unwrap();
    assert!(matches!(outcome, ItemOutcome::Failed { .. }));
    assert!(state.is_writing(&path));
    assert!(path.exists());
}
