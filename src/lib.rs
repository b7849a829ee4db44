//! idfetch Core Library
//!
//! This library provides the core of the idfetch tool: given a set of remote
//! item ids it resolves each item's metadata, classifies it by tags and score,
//! and transfers its payload with resumable, retry-tolerant, throttle-aware
//! I/O under a fixed concurrency bound.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`queue`] - Item records, backlog and shared run state
//! - [`tags`] - Tag filter expressions
//! - [`scenario`] - Scenario routing and item classification
//! - [`resolver`] - Metadata resolution contract and HTTP implementation
//! - [`download`] - HTTP client, resumable transfer, throttle monitor, scheduler
//! - [`config`] - Validated run configuration
//! - [`dump`] - Tag dump side channel

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod dump;
pub mod queue;
pub mod resolver;
pub mod scenario;
pub mod tags;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, ConfigInput, DownloadMode, NamingFlags, RunConfig};
pub use download::{
    ClientSettings, DownloadEngine, DownloadError, DownloadStats, EngineError, EngineOptions,
    FaultKind, HttpClient, ResumableTransfer, RetryDecision, RetryPolicy, RunReport,
    ThrottleMonitor, TransferOptions, classify_fault,
};
pub use dump::TagDump;
pub use queue::{Backlog, ItemOutcome, ItemRecord, ItemState, RunState};
pub use resolver::{HttpMetadataResolver, ItemMetadata, ResolveOutcome, Resolver};
pub use scenario::{Classifier, GlobalPolicy, Scenario, Subquery, UntaggedPolicy};
pub use tags::{TagExpression, TagFilter};
