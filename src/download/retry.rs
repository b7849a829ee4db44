//! Fault classification and retry policy with jittered backoff.
//!
//! # Overview
//!
//! Every failed transfer attempt is classified right away into a [`FaultKind`]:
//! - [`FaultKind::Transient`] - connection errors, size mismatches, throttling,
//!   textual payloads; retried up to the ceiling
//! - [`FaultKind::NotFound`] - HTTP 404; terminal, never retried
//! - [`FaultKind::Local`] - problems retrying cannot fix (e.g. invalid URL)
//! - [`FaultKind::Interrupted`] - the run is shutting down
//!
//! A single [`RetryPolicy::should_retry`] call then decides using the fault
//! kind and the number of failures so far.
//!
//! # Example
//!
//! ```
//! use idfetch_core::download::{
//!     DownloadError, FaultKind, RetryDecision, RetryPolicy, classify_fault,
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = DownloadError::http_status("https://example.com/v.mp4", 503);
//! assert_eq!(classify_fault(&error), FaultKind::Transient);
//!
//! match policy.should_retry(FaultKind::Transient, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::{BACKOFF_MAX, BACKOFF_MIN, TRANSFER_RETRY_CEILING};

/// Classification of a failed transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// The remote payload does not exist.
    NotFound,
    /// Failure that no amount of retrying fixes.
    Local,
    /// The run was interrupted mid-transfer.
    Interrupted,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Bounded retry counter with uniformly jittered backoff.
///
/// # Default Values
///
/// - `ceiling`: 50 failures
/// - backoff: uniform in 1..=7 seconds
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of failed attempts before giving up.
    ceiling: u32,
    /// Lower backoff bound.
    backoff_min: Duration,
    /// Upper backoff bound.
    backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            ceiling: TRANSFER_RETRY_CEILING,
            backoff_min: BACKOFF_MIN,
            backoff_max: BACKOFF_MAX,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with custom settings.
    ///
    /// # Arguments
    ///
    /// * `ceiling` - Failed attempts allowed before giving up (must be >= 1)
    /// * `backoff_min` - Lower bound of the jittered delay
    /// * `backoff_max` - Upper bound of the jittered delay
    #[must_use]
    pub fn new(ceiling: u32, backoff_min: Duration, backoff_max: Duration) -> Self {
        Self {
            ceiling: ceiling.max(1),
            backoff_min,
            backoff_max: backoff_max.max(backoff_min),
        }
    }

    /// Creates a policy with a custom ceiling and the default backoff.
    #[must_use]
    pub fn with_ceiling(ceiling: u32) -> Self {
        Self {
            ceiling: ceiling.max(1),
            ..Self::default()
        }
    }

    /// Returns the configured ceiling.
    #[must_use]
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Determines whether to retry.
    ///
    /// # Arguments
    ///
    /// * `kind` - Classification of the failure
    /// * `failures` - Failed attempts so far, including this one (1-indexed)
    #[instrument(level = "debug", skip(self), fields(ceiling = self.ceiling))]
    pub fn should_retry(&self, kind: FaultKind, failures: u32) -> RetryDecision {
        match kind {
            FaultKind::NotFound => {
                return RetryDecision::DoNotRetry {
                    reason: "not found - retry would not help".to_string(),
                };
            }
            FaultKind::Local => {
                return RetryDecision::DoNotRetry {
                    reason: "local failure - retry would not help".to_string(),
                };
            }
            FaultKind::Interrupted => {
                return RetryDecision::DoNotRetry {
                    reason: "run interrupted".to_string(),
                };
            }
            FaultKind::Transient => {}
        }

        if failures >= self.ceiling {
            debug!(failures, ceiling = self.ceiling, "retry ceiling reached");
            return RetryDecision::DoNotRetry {
                reason: format!("retry ceiling ({}) exhausted", self.ceiling),
            };
        }

        let delay = self.jittered_delay();
        debug!(
            failures,
            next_attempt = failures + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: failures + 1,
        }
    }

    /// Picks a delay uniformly between the backoff bounds.
    fn jittered_delay(&self) -> Duration {
        if self.backoff_max <= self.backoff_min {
            return self.backoff_min;
        }
        let min_ms = u64::try_from(self.backoff_min.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.backoff_max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }
}

/// Classifies a transfer error.
///
/// # Classification Rules
///
/// | Error | Kind |
/// |-------|------|
/// | HTTP 404 | `NotFound` |
/// | Any other HTTP status | `Transient` |
/// | Network / timeout / integrity / throttled / textual payload | `Transient` |
/// | IO error | `Transient` |
/// | Invalid URL | `Local` |
/// | Interrupted | `Interrupted` |
#[must_use]
pub fn classify_fault(error: &DownloadError) -> FaultKind {
    match error {
        DownloadError::HttpStatus { status: 404, .. } => FaultKind::NotFound,
        DownloadError::HttpStatus { .. }
        | DownloadError::Network { .. }
        | DownloadError::Timeout { .. }
        | DownloadError::TextualPayload { .. }
        | DownloadError::Io { .. }
        | DownloadError::Integrity { .. }
        | DownloadError::Throttled { .. } => FaultKind::Transient,
        DownloadError::InvalidUrl { .. } => FaultKind::Local,
        DownloadError::Interrupted { .. } => FaultKind::Interrupted,
    }
}
