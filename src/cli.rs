//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use idfetch_core::download::{DEFAULT_CONCURRENCY, DEFAULT_QUALITY, DEFAULT_QUEUE_CAPACITY};
use idfetch_core::{ConfigInput, DownloadMode, UntaggedPolicy};

/// Fetch, classify and store remote items by id.
///
/// Items are resolved through a metadata endpoint, filtered by tags, score
/// and an optional routing scenario, and transferred with resume and retry.
#[derive(Parser, Debug)]
#[command(name = "idfetch")]
#[command(author, version, about)]
pub struct Args {
    /// First id to fetch (inclusive)
    #[arg(short = 's', long)]
    pub start: Option<u64>,

    /// Last id to fetch (inclusive)
    #[arg(short = 'e', long)]
    pub end: Option<u64>,

    /// Explicit id sequence, e.g. 5,9,12 (excludes --start/--end)
    #[arg(long, value_delimiter = ',')]
    pub ids: Vec<u64>,

    /// Destination folder
    #[arg(short = 'p', long, default_value = ".")]
    pub path: PathBuf,

    /// Metadata endpoint URL template containing {id}
    #[arg(long, env = "IDFETCH_ENDPOINT")]
    pub endpoint: String,

    /// Preferred quality; the best available one is used if missing
    #[arg(short = 'q', long, default_value = DEFAULT_QUALITY)]
    pub quality: String,

    /// Proxy, e.g. http://127.0.0.1:8080 or socks5://127.0.0.1:1080
    #[arg(long)]
    pub proxy: Option<String>,

    /// Untagged item policy
    #[arg(long = "untagged-policy", value_enum, default_value_t = UtpArg::Nofilters)]
    pub untagged_policy: UtpArg,

    /// Routing scenario: "sub1: tags -quality 720p; sub2: -utp always"
    #[arg(long)]
    pub scenario: Option<String>,

    /// Minimum score (unknown score always passes)
    #[arg(long)]
    pub min_score: Option<i64>,

    /// Minimum rating in percent (unknown rating always passes)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub min_rating: Option<u8>,

    /// Filename segments: none|prefix|score|title|tags|quality|full joined by '|', or an integer
    #[arg(long, default_value = "full")]
    pub naming: String,

    /// File creation mode
    #[arg(long = "mode", value_enum, default_value_t = ModeArg::Full)]
    pub mode: ModeArg,

    /// Resume unfinished files and rename similar ones instead of skipping
    #[arg(long = "continue")]
    pub continue_mode: bool,

    /// Never delete unfinished files (on failure or interrupt)
    #[arg(long)]
    pub keep_unfinished: bool,

    /// Save tags of accepted items to a text file at the end
    #[arg(long)]
    pub dump_tags: bool,

    /// Transfer timeout in seconds
    #[arg(long, default_value_t = idfetch_core::download::TRANSFER_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Speed threshold in KB/s below which a transfer is dropped and retried (0 disables)
    #[arg(long, default_value_t = 0)]
    pub throttle: u64,

    /// Maximum concurrent transfers (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Prepared job queue capacity (1-100)
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_size: usize,

    /// Log verbosity
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Tag filter expressions: tag, -tag, (a|b), -(a&b); '*' wildcards allowed
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub extra_tags: Vec<String>,
}

/// Logging verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Returns the `EnvFilter` directive.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Download mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Full,
    Touch,
    Skip,
}

impl From<ModeArg> for DownloadMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => Self::Full,
            ModeArg::Touch => Self::Touch,
            ModeArg::Skip => Self::Skip,
        }
    }
}

/// Untagged policy argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UtpArg {
    Nofilters,
    Always,
}

impl From<UtpArg> for UntaggedPolicy {
    fn from(policy: UtpArg) -> Self {
        match policy {
            UtpArg::Nofilters => Self::NoFilters,
            UtpArg::Always => Self::Always,
        }
    }
}

impl Args {
    /// Converts parsed arguments into unvalidated configuration input.
    pub fn into_config_input(self) -> ConfigInput {
        ConfigInput {
            ids: self.ids,
            start: self.start,
            end: self.end,
            path: self.path,
            quality: self.quality,
            proxy: self.proxy,
            extra_tags: self.extra_tags,
            untagged_policy: self.untagged_policy.into(),
            scenario: self.scenario,
            min_score: self.min_score,
            min_rating: self.min_rating,
            naming: self.naming,
            mode: self.mode.into(),
            continue_mode: self.continue_mode,
            keep_unfinished: self.keep_unfinished,
            dump_tags: self.dump_tags,
            timeout_secs: self.timeout,
            throttle_kbps: self.throttle,
            concurrency: self.concurrency,
            queue_capacity: self.queue_size,
            endpoint: self.endpoint,
        }
    }
}
