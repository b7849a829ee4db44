//! Error types for the download module.
//!
//! These are the faults a single transfer attempt can raise. Expected
//! outcomes (already exists, skipped, filtered) are not errors; see
//! [`ItemOutcome`](crate::queue::ItemOutcome).

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during one transfer attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Unexpected HTTP status.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Server answered with a textual page instead of binary payload.
    #[error("textual response ({content_type}) instead of payload at {url}")]
    TextualPayload {
        /// The URL that returned text.
        url: String,
        /// The reported content type.
        content_type: String,
    },

    /// File system error during download (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Downloaded file size does not match expected size.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Download path that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// Transfer speed stayed below the floor for the sustained window.
    #[error("throttled downloading {url}: below {floor_bytes_per_sec} B/s")]
    Throttled {
        /// The URL being transferred.
        url: String,
        /// Configured speed floor.
        floor_bytes_per_sec: u64,
    },

    /// Transfer aborted because the run was interrupted.
    #[error("interrupted downloading {url}")]
    Interrupted {
        /// The URL being transferred.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a network or timeout error depending on the reqwest error kind.
    pub fn from_request(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a textual payload error.
    pub fn textual_payload(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::TextualPayload {
            url: url.into(),
            content_type: content_type.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a throttle abort error.
    pub fn throttled(url: impl Into<String>, floor_bytes_per_sec: u64) -> Self {
        Self::Throttled {
            url: url.into(),
            floor_bytes_per_sec,
        }
    }

    /// Creates an interrupt abort error.
    pub fn interrupted(url: impl Into<String>) -> Self {
        Self::Interrupted { url: url.into() }
    }
}

// No From<reqwest::Error> / From<std::io::Error>: every variant needs the url or
// path as context, which the source errors do not carry.
