//! Constants for the download module (timeouts, retry budgets, naming).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Whole-transfer timeout ceiling (2 hours for large payloads).
pub const TRANSFER_TIMEOUT_SECS: u64 = 7200;

/// Per-request metadata resolution timeout.
pub const RESOLVER_TIMEOUT_SECS: u64 = 10;

/// Transfer retry ceiling per item.
pub const TRANSFER_RETRY_CEILING: u32 = 50;

/// Network retry budget per metadata request.
pub const RESOLVER_RETRY_BUDGET: u32 = 5;

/// Re-resolution attempts when the payload section is missing.
pub const NO_PAYLOAD_RETRIES: u32 = 5;

/// Lower bound of the jittered retry backoff.
pub const BACKOFF_MIN: Duration = Duration::from_secs(1);

/// Upper bound of the jittered retry backoff.
pub const BACKOFF_MAX: Duration = Duration::from_secs(7);

/// Throttle monitor sampling interval.
pub const THROTTLE_INTERVAL: Duration = Duration::from_secs(10);

/// Consecutive below-floor samples that count as sustained throttling.
pub const THROTTLE_SUSTAINED_SAMPLES: u32 = 3;

/// Default prepared-job queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Maximum length of a full destination path.
pub const MAX_FULL_PATH_LEN: usize = 240;

/// Filename prefix placed before the id.
pub const FILENAME_PREFIX: &str = "id_";

/// Separator between tags in the filename tag segment.
pub const TAG_SEPARATOR: char = ',';

/// Known quality tiers, best first.
pub const QUALITIES: &[&str] = &["2160p", "1080p", "720p", "480p", "360p", "preview"];

/// Quality requested when none is configured.
pub const DEFAULT_QUALITY: &str = "360p";

/// Extension used when the transfer link has none.
pub const DEFAULT_EXTENSION: &str = "mp4";
