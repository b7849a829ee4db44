//! Error types for scenario string parsing.

use thiserror::Error;

use crate::tags::TagExpressionError;

/// Errors produced while parsing a download scenario string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScenarioParseError {
    /// Scenario string contained no subqueries.
    #[error("scenario contains no subqueries")]
    Empty,

    /// A subquery lacks the `<subfolder>:` head.
    #[error("subquery '{subquery}' must start with '<subfolder>:'")]
    MissingSubfolder {
        /// The offending subquery text.
        subquery: String,
    },

    /// Two subqueries target the same subfolder.
    #[error("duplicate scenario subfolder '{subfolder}'")]
    DuplicateSubfolder {
        /// The repeated subfolder.
        subfolder: String,
    },

    /// An option is missing its value.
    #[error("option {option} in subquery '{subfolder}' requires a value")]
    MissingValue {
        /// Subquery subfolder.
        subfolder: String,
        /// Option name, e.g. `-quality`.
        option: &'static str,
    },

    /// An option appears more than once within a subquery.
    #[error("option {option} given more than once in subquery '{subfolder}'")]
    DuplicateOption {
        /// Subquery subfolder.
        subfolder: String,
        /// Option name.
        option: &'static str,
    },

    /// An option value is out of range or unrecognized.
    #[error("invalid value '{value}' for {option} in subquery '{subfolder}'")]
    InvalidValue {
        /// Subquery subfolder.
        subfolder: String,
        /// Option name.
        option: &'static str,
        /// Rejected value.
        value: String,
    },

    /// A tag expression inside a subquery is malformed.
    #[error("invalid tag expression in subquery '{subfolder}': {source}")]
    Tag {
        /// Subquery subfolder.
        subfolder: String,
        /// Underlying expression error.
        #[source]
        source: TagExpressionError,
    },

    /// More than one subquery declares the always-accept untagged policy.
    #[error("only one subquery may use '-utp always' (found in '{first}' and '{second}')")]
    MultipleUntaggedFallbacks {
        /// First subquery with the policy.
        first: String,
        /// Second subquery with the policy.
        second: String,
    },
}

impl ScenarioParseError {
    /// Creates a missing-value error.
    pub fn missing_value(subfolder: impl Into<String>, option: &'static str) -> Self {
        Self::MissingValue {
            subfolder: subfolder.into(),
            option,
        }
    }

    /// Creates a duplicate-option error.
    pub fn duplicate_option(subfolder: impl Into<String>, option: &'static str) -> Self {
        Self::DuplicateOption {
            subfolder: subfolder.into(),
            option,
        }
    }

    /// Creates an invalid-value error.
    pub fn invalid_value(
        subfolder: impl Into<String>,
        option: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            subfolder: subfolder.into(),
            option,
            value: value.into(),
        }
    }

    /// Wraps a tag expression error with its subquery context.
    pub fn tag(subfolder: impl Into<String>, source: TagExpressionError) -> Self {
        Self::Tag {
            subfolder: subfolder.into(),
            source,
        }
    }
}
