//! JSON metadata endpoint resolver.
//!
//! The endpoint template contains an `{id}` placeholder and answers with:
//!
//! ```json
//! {
//!   "title": "Some title",
//!   "tags": ["tag_a", "tag_b"],
//!   "score": 12,
//!   "rating": 85,
//!   "qualities": [{"label": "720p", "link": "https://cdn/1.mp4"}],
//!   "unavailable": null
//! }
//! ```
//!
//! A missing or `null` `tags` field means tag extraction failed. HTTP 404 is
//! [`ResolveOutcome::NotFound`]; an empty `qualities` list is
//! [`ResolveOutcome::NoPayloadYet`] unless `unavailable` carries a message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ItemMetadata, QualityLink, ResolveError, ResolveOutcome, Resolver};
use crate::download::client::build_client;
use crate::download::{
    ClientSettings, FaultKind, RESOLVER_RETRY_BUDGET, RESOLVER_TIMEOUT_SECS, RetryDecision,
    RetryPolicy,
};
use crate::queue::ItemId;
use crate::tags::normalize_tag;

/// Endpoint placeholder replaced by the item id.
const ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    title: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    rating: Option<u8>,
    #[serde(default)]
    qualities: Vec<QualityEntry>,
    #[serde(default)]
    unavailable: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QualityEntry {
    label: String,
    link: String,
}

/// Resolves items through an HTTP JSON endpoint.
pub struct HttpMetadataResolver {
    client: Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl HttpMetadataResolver {
    /// Creates a resolver for `endpoint` (must contain `{id}`).
    ///
    /// The transfer timeout in `settings` is replaced by the short metadata
    /// timeout; proxy and connect timeout are kept.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Client`] when the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, settings: &ClientSettings) -> Result<Self, ResolveError> {
        let settings = settings.with_timeout(Duration::from_secs(RESOLVER_TIMEOUT_SECS));
        let client = build_client(&settings).map_err(|e| ResolveError::Client {
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            retry: RetryPolicy::with_ceiling(RESOLVER_RETRY_BUDGET),
        })
    }

    /// Replaces the retry policy used for transient metadata failures.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url_for(&self, id: ItemId) -> String {
        self.endpoint.replace(ID_PLACEHOLDER, &id.to_string())
    }

    async fn fetch_once(&self, id: ItemId) -> Result<ResolveOutcome, ResolveError> {
        let url = self.url_for(id);
        debug!(url = %url, "requesting metadata");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolveError::network(id, e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(ResolveOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(ResolveError::HttpStatus {
                id,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ResolveError::network(id, e.to_string()))?;
        let parsed: MetadataResponse =
            serde_json::from_str(&body).map_err(|e| ResolveError::malformed(id, e.to_string()))?;
        Ok(into_outcome(parsed))
    }
}

fn into_outcome(parsed: MetadataResponse) -> ResolveOutcome {
    if parsed.qualities.is_empty() {
        return match parsed.unavailable.filter(|m| !m.trim().is_empty()) {
            Some(reason) => ResolveOutcome::Unavailable { reason },
            None => ResolveOutcome::NoPayloadYet,
        };
    }

    let tags = parsed.tags.map(|tags| {
        tags.iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty())
            .collect()
    });
    ResolveOutcome::Found(ItemMetadata {
        title: parsed.title.trim().to_string(),
        tags,
        score: parsed.score,
        rating: parsed.rating,
        qualities: parsed
            .qualities
            .into_iter()
            .map(|q| QualityLink::new(q.label, q.link))
            .collect(),
    })
}

impl std::fmt::Debug for HttpMetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMetadataResolver")
            .field("endpoint", &self.endpoint)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for HttpMetadataResolver {
    fn name(&self) -> &'static str {
        "http"
    }

    #[tracing::instrument(skip(self), fields(resolver = "http"))]
    async fn resolve(&self, id: ItemId) -> Result<ResolveOutcome, ResolveError> {
        let mut failures = 0u32;
        loop {
            let error = match self.fetch_once(id).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };
            failures += 1;
            match self.retry.should_retry(FaultKind::Transient, failures) {
                RetryDecision::Retry { delay, attempt } => {
                    warn!(attempt, error = %error, "metadata request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { .. } => return Err(error),
            }
        }
    }
}
