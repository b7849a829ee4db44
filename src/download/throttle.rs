//! Throttle monitor: aborts a transfer whose speed stays below a floor.
//!
//! # Overview
//!
//! [`ThrottleWindow`] is the pure part: it is fed one sample per interval and
//! reports [`ThrottleVerdict::Throttled`] only after a sustained run of
//! below-floor samples. [`ThrottleMonitor::watch`] drives a window from a
//! shared byte counter on a timer and cancels the attempt's token when the
//! verdict fires; the transfer then surfaces a transient fault.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::constants::{THROTTLE_INTERVAL, THROTTLE_SUSTAINED_SAMPLES};

/// Fewest consecutive slow samples that may trigger an abort.
const MIN_SUSTAINED_SAMPLES: u32 = 2;

/// Result of feeding one sample to a [`ThrottleWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleVerdict {
    /// Throughput at or above the floor.
    Ok,
    /// Below the floor, but not yet for long enough.
    Slow {
        /// Consecutive below-floor samples so far.
        consecutive: u32,
    },
    /// Below the floor for the whole sustained window.
    Throttled,
}

/// Counts consecutive below-floor samples.
#[derive(Debug, Clone)]
pub struct ThrottleWindow {
    floor_bytes_per_sec: u64,
    sustained: u32,
    below: u32,
}

impl ThrottleWindow {
    /// Creates a window. `sustained` is raised to at least 2 so a single stall
    /// never aborts a transfer.
    #[must_use]
    pub fn new(floor_bytes_per_sec: u64, sustained: u32) -> Self {
        Self {
            floor_bytes_per_sec,
            sustained: sustained.max(MIN_SUSTAINED_SAMPLES),
            below: 0,
        }
    }

    /// Feeds `bytes` transferred over `elapsed`.
    pub fn observe(&mut self, bytes: u64, elapsed: Duration) -> ThrottleVerdict {
        let secs = elapsed.as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let rate = if secs > 0.0 {
            bytes as f64 / secs
        } else {
            f64::INFINITY
        };
        #[allow(clippy::cast_precision_loss)]
        let floor = self.floor_bytes_per_sec as f64;

        if rate >= floor {
            self.below = 0;
            return ThrottleVerdict::Ok;
        }
        self.below += 1;
        if self.below >= self.sustained {
            ThrottleVerdict::Throttled
        } else {
            ThrottleVerdict::Slow {
                consecutive: self.below,
            }
        }
    }

    /// Clears the slow-sample count.
    pub fn reset(&mut self) {
        self.below = 0;
    }
}

/// Spawns per-attempt throttle watchers.
#[derive(Debug, Clone)]
pub struct ThrottleMonitor {
    floor_bytes_per_sec: u64,
    interval: Duration,
    sustained: u32,
}

impl ThrottleMonitor {
    /// Creates a monitor with the default interval and window.
    ///
    /// A floor of zero disables monitoring.
    #[must_use]
    pub fn new(floor_bytes_per_sec: u64) -> Self {
        Self::with_timing(floor_bytes_per_sec, THROTTLE_INTERVAL, THROTTLE_SUSTAINED_SAMPLES)
    }

    /// Creates a monitor with explicit sampling interval and sustained window.
    #[must_use]
    pub fn with_timing(floor_bytes_per_sec: u64, interval: Duration, sustained: u32) -> Self {
        Self {
            floor_bytes_per_sec,
            interval: interval.max(Duration::from_millis(1)),
            sustained,
        }
    }

    /// Creates a monitor that never fires.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Returns true if a floor is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.floor_bytes_per_sec > 0
    }

    /// Returns the configured floor in bytes per second.
    #[must_use]
    pub fn floor(&self) -> u64 {
        self.floor_bytes_per_sec
    }

    /// Starts watching `progress` (cumulative bytes written this attempt).
    ///
    /// When throttling is detected `abort` is cancelled. The watcher stops when
    /// the returned guard is dropped.
    #[must_use = "dropping the guard stops the watcher immediately"]
    pub fn watch(&self, progress: Arc<AtomicU64>, abort: CancellationToken) -> ThrottleGuard {
        if !self.is_enabled() {
            return ThrottleGuard { handle: None };
        }

        let mut window = ThrottleWindow::new(self.floor_bytes_per_sec, self.sustained);
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_bytes = progress.load(Ordering::Relaxed);
            let mut last_at = Instant::now();

            loop {
                tokio::select! {
                    () = abort.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let now = Instant::now();
                let bytes = progress.load(Ordering::Relaxed);
                let verdict = window.observe(bytes.saturating_sub(last_bytes), now - last_at);
                last_bytes = bytes;
                last_at = now;

                match verdict {
                    ThrottleVerdict::Ok => {}
                    ThrottleVerdict::Slow { consecutive } => {
                        debug!(consecutive, bytes, "transfer below speed floor");
                    }
                    ThrottleVerdict::Throttled => {
                        warn!(bytes, "sustained low transfer speed, dropping connection");
                        abort.cancel();
                        return;
                    }
                }
            }
        });
        ThrottleGuard {
            handle: Some(handle),
        }
    }
}

/// Stops the watcher task on drop.
#[derive(Debug)]
pub struct ThrottleGuard {
    handle: Option<JoinHandle<()>>,
}

impl Drop for ThrottleGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
