//! Metadata resolution: turns an item id into title, tags, score and links.
//!
//! The scheduler only depends on the [`Resolver`] trait, so site-specific
//! scraping stays outside the engine. [`HttpMetadataResolver`] is the stock
//! implementation over a JSON endpoint.
//!
//! # Example
//!
//! ```no_run
//! use idfetch_core::download::ClientSettings;
//! use idfetch_core::resolver::{HttpMetadataResolver, ResolveOutcome, Resolver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = HttpMetadataResolver::new(
//!     "https://meta.example.com/items/{id}",
//!     &ClientSettings::default(),
//! )?;
//! if let ResolveOutcome::Found(meta) = resolver.resolve(42).await? {
//!     println!("{} has {} qualities", meta.title, meta.qualities.len());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod http;

pub use error::ResolveError;
pub use http::HttpMetadataResolver;

use async_trait::async_trait;

use crate::queue::ItemId;

/// One available encoding of an item's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityLink {
    /// Quality label, e.g. `720p`.
    pub label: String,
    /// Transfer URL.
    pub link: String,
}

impl QualityLink {
    /// Creates a quality link.
    #[must_use]
    pub fn new(label: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            link: link.into(),
        }
    }
}

/// Metadata for one item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemMetadata {
    /// Item title.
    pub title: String,
    /// Extracted tags; `None` when extraction failed (distinct from no tags).
    pub tags: Option<Vec<String>>,
    /// Score, if known.
    pub score: Option<i64>,
    /// Rating percent, if known.
    pub rating: Option<u8>,
    /// Available qualities, best first.
    pub qualities: Vec<QualityLink>,
}

impl ItemMetadata {
    /// Picks the link for `wanted`, falling back to the first (best) quality.
    ///
    /// The boolean is true when the fallback was used.
    #[must_use]
    pub fn select_quality(&self, wanted: &str) -> Option<(&QualityLink, bool)> {
        self.qualities
            .iter()
            .find(|q| q.label == wanted)
            .map(|q| (q, false))
            .or_else(|| self.qualities.first().map(|q| (q, true)))
    }
}

/// What a resolver learned about an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Metadata with at least one quality.
    Found(ItemMetadata),
    /// Item does not exist.
    NotFound,
    /// Item exists but has no payload links yet; the caller retries a few times.
    NoPayloadYet,
    /// Payload section replaced by a server message; not retried.
    Unavailable {
        /// Message shown by the server.
        reason: String,
    },
}

/// Resolves item ids to metadata.
///
/// Uses `async_trait` so engines can hold a `Arc<dyn Resolver>`.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Returns the resolver's name for logging.
    fn name(&self) -> &str;

    /// Resolves one item.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the metadata could not be obtained within
    /// the resolver's own retry budget.
    async fn resolve(&self, id: ItemId) -> Result<ResolveOutcome, ResolveError>;
}
