//! Transfer side of a run: HTTP client, resumable transfers, throttle
//! detection and the scheduler that drives them.
//!
//! # Features
//!
//! - Range-resumed streaming transfers with size verification
//! - Fault classification and jittered retry with a ceiling
//! - Throttle detection that drops slow connections
//! - Length-budgeted filenames and existing-file matching
//! - Bounded producer/consumer scheduling with progress snapshots
//!
//! # Example
//!
//! ```no_run
//! use idfetch_core::download::{ClientSettings, HttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(&ClientSettings::default())?;
//! let response = client.get_from("https://example.com/video.mp4", 0).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

pub(crate) mod client;
mod constants;
mod engine;
mod error;
pub mod filename;
mod retry;
pub mod throttle;
mod transfer;

pub use client::{ClientSettings, HttpClient};
pub use constants::{
    BACKOFF_MAX, BACKOFF_MIN, CONNECT_TIMEOUT_SECS, DEFAULT_EXTENSION, DEFAULT_QUALITY,
    DEFAULT_QUEUE_CAPACITY, FILENAME_PREFIX, MAX_FULL_PATH_LEN, NO_PAYLOAD_RETRIES, QUALITIES,
    RESOLVER_RETRY_BUDGET, RESOLVER_TIMEOUT_SECS, TAG_SEPARATOR, THROTTLE_INTERVAL,
    THROTTLE_SUSTAINED_SAMPLES, TRANSFER_RETRY_CEILING, TRANSFER_TIMEOUT_SECS,
};
pub use engine::{
    DEFAULT_CONCURRENCY, DownloadEngine, DownloadStats, EngineError, EngineOptions, RunReport,
    Snapshot,
};
pub use error::DownloadError;
pub use retry::{FaultKind, RetryDecision, RetryPolicy, classify_fault};
pub use throttle::{ThrottleMonitor, ThrottleVerdict, ThrottleWindow};
pub use transfer::{ResumableTransfer, TransferOptions};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
