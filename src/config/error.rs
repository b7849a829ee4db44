//! Fatal configuration errors.

use thiserror::Error;

use crate::scenario::ScenarioParseError;
use crate::tags::TagExpressionError;

/// A configuration contradiction detected before scheduling starts.
///
/// Any of these aborts the whole run.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `start` is greater than `end`.
    #[error("invalid id bounds: start {start} is greater than end {end}")]
    InvalidIdBounds {
        /// First id.
        start: u64,
        /// Last id.
        end: u64,
    },

    /// The id range expands to more ids than one run accepts.
    #[error("id range {start}..={end} spans more than {max} ids")]
    RangeTooLarge {
        /// First id.
        start: u64,
        /// Last id.
        end: u64,
        /// Largest accepted span.
        max: u64,
    },

    /// Both an explicit id list and a range were given.
    #[error("id list and id range are mutually exclusive")]
    ConflictingIdSources,

    /// Nothing to fetch.
    #[error("no ids to process: give --ids or --start/--end")]
    NoIds,

    /// A numeric option is out of bounds.
    #[error("{option} must be in {min}..={max}, got {value}")]
    OutOfRange {
        /// Option name.
        option: &'static str,
        /// Given value.
        value: u64,
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
    },

    /// Naming flags did not parse.
    #[error("invalid naming flags '{value}' (use none|prefix|score|title|tags|quality|full, or an integer)")]
    InvalidNamingFlags {
        /// Raw value.
        value: String,
    },

    /// Proxy did not validate.
    #[error("invalid proxy '{value}': {reason}")]
    InvalidProxy {
        /// Raw value.
        value: String,
        /// What is wrong.
        reason: String,
    },

    /// Unknown quality label.
    #[error("invalid quality '{value}'")]
    InvalidQuality {
        /// Raw value.
        value: String,
    },

    /// Metadata endpoint is missing or has no `{id}` placeholder.
    #[error("invalid metadata endpoint '{value}': must be an http(s) URL template containing {{id}}")]
    InvalidEndpoint {
        /// Raw value.
        value: String,
    },

    /// A global tag expression did not parse.
    #[error("invalid tag filter: {0}")]
    Tags(#[source] TagExpressionError),

    /// The scenario string did not parse.
    #[error("invalid scenario: {0}")]
    Scenario(#[source] ScenarioParseError),
}

impl ConfigError {
    /// Creates an out-of-range error.
    #[must_use]
    pub fn out_of_range(option: &'static str, value: u64, min: u64, max: u64) -> Self {
        Self::OutOfRange {
            option,
            value,
            min,
            max,
        }
    }

    /// Creates a naming flags error.
    #[must_use]
    pub fn invalid_naming_flags(value: impl Into<String>) -> Self {
        Self::InvalidNamingFlags {
            value: value.into(),
        }
    }

    /// Creates a proxy error.
    #[must_use]
    pub fn invalid_proxy(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProxy {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates an endpoint error.
    #[must_use]
    pub fn invalid_endpoint(value: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            value: value.into(),
        }
    }
}
