//! Error types for metadata resolution.

use thiserror::Error;

use crate::queue::ItemId;

/// Errors raised while resolving an item's metadata.
///
/// Expected outcomes (not found, no payload yet, unavailable) are
/// [`ResolveOutcome`](super::ResolveOutcome) variants, not errors.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Request could not be sent or the response body could not be read.
    #[error("metadata request for item {id} failed: {reason}")]
    Network {
        /// Item being resolved.
        id: ItemId,
        /// Underlying failure.
        reason: String,
    },

    /// Endpoint answered with an unexpected HTTP status.
    #[error("metadata endpoint returned HTTP {status} for item {id}")]
    HttpStatus {
        /// Item being resolved.
        id: ItemId,
        /// HTTP status code.
        status: u16,
    },

    /// Response body did not match the expected format.
    #[error("malformed metadata for item {id}: {reason}")]
    Malformed {
        /// Item being resolved.
        id: ItemId,
        /// What was wrong.
        reason: String,
    },

    /// The resolver could not be constructed.
    #[error("cannot build metadata client: {reason}")]
    Client {
        /// Underlying failure.
        reason: String,
    },
}

impl ResolveError {
    /// Creates a network error.
    #[must_use]
    pub fn network(id: ItemId, reason: impl Into<String>) -> Self {
        Self::Network {
            id,
            reason: reason.into(),
        }
    }

    /// Creates a malformed-response error.
    #[must_use]
    pub fn malformed(id: ItemId, reason: impl Into<String>) -> Self {
        Self::Malformed {
            id,
            reason: reason.into(),
        }
    }

    /// Returns true if another request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed { .. } | Self::Client { .. } => false,
        }
    }
}
