//! Validated run configuration.
//!
//! [`ConfigInput`] carries raw user input (from the CLI or from tests);
//! [`RunConfig::from_input`] validates it into the settings a run needs.
//! Every contradiction is a [`ConfigError`] and aborts the run before anything
//! is scheduled.

mod error;
mod naming;
mod proxy;

pub use error::ConfigError;
pub use naming::NamingFlags;
pub use proxy::validate_proxy;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::download::{
    DEFAULT_QUALITY, DEFAULT_QUEUE_CAPACITY, FILENAME_PREFIX, QUALITIES, TRANSFER_TIMEOUT_SECS,
};
use crate::queue::ItemId;
use crate::scenario::{GlobalPolicy, Scenario, UntaggedPolicy, parse_scenario};
use crate::tags::TagFilter;

/// Upper bound for worker concurrency and queue capacity.
pub const MAX_CONCURRENCY: usize = 100;

/// Maximum rating value (percent).
pub const MAX_RATING: u8 = 100;

/// Largest number of ids a `--start`/`--end` range may expand to.
pub const MAX_RANGE_SPAN: u64 = 1_000_000;

/// How files are created for accepted items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DownloadMode {
    /// Transfer the payload.
    #[default]
    Full,
    /// Create an empty placeholder file, no network transfer.
    Touch,
    /// No file operation at all.
    Skip,
}

impl DownloadMode {
    /// Returns the command-line spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Touch => "touch",
            Self::Skip => "skip",
        }
    }
}

impl FromStr for DownloadMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "touch" => Ok(Self::Touch),
            "skip" => Ok(Self::Skip),
            _ => Err(()),
        }
    }
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated run settings.
#[derive(Debug, Clone)]
pub struct ConfigInput {
    /// Explicit id sequence.
    pub ids: Vec<ItemId>,
    /// First id of a range.
    pub start: Option<ItemId>,
    /// Last id of a range (inclusive).
    pub end: Option<ItemId>,
    /// Destination base folder.
    pub path: PathBuf,
    /// Requested quality.
    pub quality: String,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Global tag filter expressions.
    pub extra_tags: Vec<String>,
    /// Untagged item policy.
    pub untagged_policy: UntaggedPolicy,
    /// Scenario string.
    pub scenario: Option<String>,
    /// Global score floor.
    pub min_score: Option<i64>,
    /// Global rating floor.
    pub min_rating: Option<u8>,
    /// Naming flags as typed by the user.
    pub naming: String,
    /// File creation mode.
    pub mode: DownloadMode,
    /// Resume or rename existing files.
    pub continue_mode: bool,
    /// Never delete unfinished files.
    pub keep_unfinished: bool,
    /// Write a tag dump at the end of the run.
    pub dump_tags: bool,
    /// Transfer timeout in seconds.
    pub timeout_secs: u64,
    /// Throttle floor in KB/s, zero disables.
    pub throttle_kbps: u64,
    /// Worker concurrency.
    pub concurrency: usize,
    /// Prepared-job queue capacity.
    pub queue_capacity: usize,
    /// Metadata endpoint template with an `{id}` placeholder.
    pub endpoint: String,
}

impl Default for ConfigInput {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            start: None,
            end: None,
            path: PathBuf::from("."),
            quality: DEFAULT_QUALITY.to_string(),
            proxy: None,
            extra_tags: Vec::new(),
            untagged_policy: UntaggedPolicy::default(),
            scenario: None,
            min_score: None,
            min_rating: None,
            naming: NamingFlags::default().to_string(),
            mode: DownloadMode::default(),
            continue_mode: false,
            keep_unfinished: false,
            dump_tags: false,
            timeout_secs: TRANSFER_TIMEOUT_SECS,
            throttle_kbps: 0,
            concurrency: DEFAULT_QUEUE_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            endpoint: String::new(),
        }
    }
}

/// Validated run settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Ids to process in order, duplicates removed.
    pub ids: Vec<ItemId>,
    /// Destination base folder.
    pub base: PathBuf,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Outer classification policy.
    pub global: GlobalPolicy,
    /// Scenario, if configured.
    pub scenario: Option<Scenario>,
    /// Naming flags.
    pub naming: NamingFlags,
    /// Filename prefix.
    pub prefix: String,
    /// File creation mode.
    pub mode: DownloadMode,
    /// Resume or rename existing files.
    pub continue_mode: bool,
    /// Never delete unfinished files.
    pub keep_unfinished: bool,
    /// Write a tag dump at the end of the run.
    pub dump_tags: bool,
    /// Transfer timeout.
    pub timeout: Duration,
    /// Throttle floor in bytes per second, zero disables.
    pub throttle_floor: u64,
    /// Worker concurrency.
    pub concurrency: usize,
    /// Prepared-job queue capacity.
    pub queue_capacity: usize,
    /// Metadata endpoint template.
    pub endpoint: String,
    /// Non-fatal notes about ignored or overridden settings.
    pub notes: Vec<String>,
}

impl RunConfig {
    /// Validates raw input.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn from_input(input: ConfigInput) -> Result<Self, ConfigError> {
        let ids = collect_ids(&input.ids, input.start, input.end)?;
        check_range("concurrency", input.concurrency, 1, MAX_CONCURRENCY)?;
        check_range("queue capacity", input.queue_capacity, 1, MAX_CONCURRENCY)?;
        if let Some(rating) = input.min_rating
            && rating > MAX_RATING
        {
            return Err(ConfigError::out_of_range(
                "min rating",
                u64::from(rating),
                0,
                u64::from(MAX_RATING),
            ));
        }
        if !QUALITIES.contains(&input.quality.as_str()) {
            return Err(ConfigError::InvalidQuality {
                value: input.quality,
            });
        }
        let naming: NamingFlags = input.naming.parse()?;
        if let Some(proxy) = &input.proxy {
            validate_proxy(proxy)?;
        }
        validate_endpoint(&input.endpoint)?;

        let extra_tags = TagFilter::parse_all(&input.extra_tags).map_err(ConfigError::Tags)?;
        let scenario = input
            .scenario
            .as_deref()
            .map(|raw| parse_scenario(raw, &input.quality))
            .transpose()
            .map_err(ConfigError::Scenario)?;

        let global = GlobalPolicy {
            extra_tags,
            untagged_policy: input.untagged_policy,
            min_score: input.min_score,
            min_rating: input.min_rating,
            quality: input.quality,
        };
        let notes = scenario_notes(&global, scenario.as_ref());

        Ok(Self {
            ids,
            base: input.path,
            proxy: input.proxy,
            global,
            scenario,
            naming,
            prefix: FILENAME_PREFIX.to_string(),
            mode: input.mode,
            continue_mode: input.continue_mode,
            keep_unfinished: input.keep_unfinished,
            dump_tags: input.dump_tags,
            timeout: Duration::from_secs(input.timeout_secs.max(1)),
            throttle_floor: input.throttle_kbps.saturating_mul(1024),
            concurrency: input.concurrency,
            queue_capacity: input.queue_capacity,
            endpoint: input.endpoint,
            notes,
        })
    }

    /// Logs the informational notes at info level.
    pub fn log_notes(&self) {
        for note in &self.notes {
            info!("{note}");
        }
    }
}

fn collect_ids(
    ids: &[ItemId],
    start: Option<ItemId>,
    end: Option<ItemId>,
) -> Result<Vec<ItemId>, ConfigError> {
    if !ids.is_empty() {
        if start.is_some() || end.is_some() {
            return Err(ConfigError::ConflictingIdSources);
        }
        let mut seen = std::collections::HashSet::new();
        return Ok(ids.iter().copied().filter(|id| seen.insert(*id)).collect());
    }
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(ConfigError::InvalidIdBounds { start, end }),
        (Some(start), Some(end)) => {
            let span = (end - start).saturating_add(1);
            if span > MAX_RANGE_SPAN {
                return Err(ConfigError::RangeTooLarge {
                    start,
                    end,
                    max: MAX_RANGE_SPAN,
                });
            }
            Ok((start..=end).collect())
        }
        (Some(single), None) | (None, Some(single)) => Ok(vec![single]),
        (None, None) => Err(ConfigError::NoIds),
    }
}

fn check_range(option: &'static str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(
            option,
            value as u64,
            min as u64,
            max as u64,
        ))
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    if !endpoint.contains("{id}") {
        return Err(ConfigError::invalid_endpoint(endpoint));
    }
    let sample = endpoint.replace("{id}", "1");
    match url::Url::parse(&sample) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::invalid_endpoint(endpoint)),
    }
}

fn scenario_notes(global: &GlobalPolicy, scenario: Option<&Scenario>) -> Vec<String> {
    let mut notes = Vec::new();
    if scenario.is_none() {
        return notes;
    }
    if global.untagged_policy != UntaggedPolicy::default() {
        notes.push(format!(
            "scenario is set, untagged policy '{}' is ignored (use -utp inside the scenario)",
            global.untagged_policy
        ));
    }
    if global.quality != DEFAULT_QUALITY {
        notes.push(format!(
            "scenario is set, quality '{}' is only used as the subquery default",
            global.quality
        ));
    }
    if !global.extra_tags.is_empty() {
        let rendered: Vec<String> = global
            .extra_tags
            .expressions()
            .iter()
            .map(ToString::to_string)
            .collect();
        notes.push(format!(
            "extra tags ({}) are applied to every item before the scenario",
            rendered.join(" ")
        ));
    }
    if let Some(min) = global.min_score {
        notes.push(format!("minimum score {min} is applied before the scenario"));
    }
    if let Some(min) = global.min_rating {
        notes.push(format!("minimum rating {min}% is applied before the scenario"));
    }
    notes
}
