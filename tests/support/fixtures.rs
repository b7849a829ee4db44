//! Shared builders for transfer and scheduler tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use idfetch_core::config::{DownloadMode, NamingFlags};
use idfetch_core::download::{
    ClientSettings, EngineOptions, HttpClient, ResumableTransfer, RetryPolicy, ThrottleMonitor,
    TransferOptions,
};
use idfetch_core::queue::{ItemId, ItemRecord};
use idfetch_core::resolver::{ItemMetadata, QualityLink, ResolveError, ResolveOutcome, Resolver};
use idfetch_core::scenario::{Classifier, GlobalPolicy, UntaggedPolicy};
use idfetch_core::tags::TagFilter;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Resolver answering from a fixed table; unknown ids are `NotFound`.
#[derive(Debug, Default)]
pub struct FakeResolver {
    answers: HashMap<ItemId, ResolveOutcome>,
    calls: AtomicUsize,
    delay: Duration,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: ItemId, outcome: ResolveOutcome) -> Self {
        self.answers.insert(id, outcome);
        self
    }

    /// Every answer waits `delay` first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn resolve(&self, id: ItemId) -> Result<ResolveOutcome, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self
            .answers
            .get(&id)
            .cloned()
            .unwrap_or(ResolveOutcome::NotFound))
    }
}

/// `Found` metadata with a single quality.
pub fn found(title: &str, tags: &[&str], quality: &str, link: &str) -> ResolveOutcome {
    ResolveOutcome::Found(ItemMetadata {
        title: title.to_string(),
        tags: Some(tags.iter().map(ToString::to_string).collect()),
        score: None,
        rating: None,
        qualities: vec![QualityLink::new(quality, link)],
    })
}

/// Retry policy with no backoff.
pub fn fast_policy(ceiling: u32) -> RetryPolicy {
    RetryPolicy::new(ceiling, Duration::ZERO, Duration::ZERO)
}

pub fn transfer_options(base: &Path) -> TransferOptions {
    TransferOptions {
        base: base.to_path_buf(),
        mode: DownloadMode::Full,
        continue_mode: false,
        keep_unfinished: false,
        naming: NamingFlags::ALL,
        prefix: "id_".to_string(),
    }
}

pub fn transfer(options: TransferOptions, ceiling: u32, throttle: ThrottleMonitor) -> ResumableTransfer {
    let client = HttpClient::new(&ClientSettings::default()).unwrap();
    ResumableTransfer::new(client, fast_policy(ceiling), throttle, options)
}

/// Flat classifier with the given global tag expressions.
pub fn classifier(extra_tags: &[&str]) -> Classifier {
    Classifier::new(
        GlobalPolicy {
            extra_tags: TagFilter::parse_all(extra_tags).unwrap(),
            untagged_policy: UntaggedPolicy::NoFilters,
            min_score: None,
            min_rating: None,
            quality: "360p".to_string(),
        },
        None,
    )
}

/// Engine options for tests: no politeness delay, fast reporter.
pub fn engine_options(concurrency: usize) -> EngineOptions {
    EngineOptions {
        concurrency,
        queue_capacity: concurrency,
        politeness: 0.0,
        report_interval: Duration::from_millis(10),
        no_payload_retries: 2,
        no_payload_delay: Duration::ZERO,
    }
}

/// An item already scanned: link and filename set.
pub fn scanned_item(id: ItemId, link: &str) -> ItemRecord {
    let mut item = ItemRecord::new(id, "360p");
    item.link = Some(link.to_string());
    item.filename = Some(format!("id_{id}_360p.mp4"));
    item
}

/// Raw HTTP server that declares `declared_len` bytes, sends `sent`, then
/// holds the connection for `hold` before closing it.
///
/// Returns the URL and a connection counter, or `None` if binding fails.
pub async fn spawn_short_body_server(
    declared_len: usize,
    sent: &'static [u8],
    hold: Duration,
) -> Option<(String, Arc<AtomicUsize>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.ok()?;
    let addr = listener.local_addr().ok()?;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nContent-Length: {declared_len}\r\n\r\n"
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(sent).await;
                let _ = socket.flush().await;
                tokio::time::sleep(hold).await;
            });
        }
    });
    Some((format!("http://{addr}/v.mp4"), hits))
}
