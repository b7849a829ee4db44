//! Error types for tag expression parsing.

use thiserror::Error;

/// Errors produced while parsing a tag filter expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TagExpressionError {
    /// Expression was empty or whitespace only.
    #[error("empty tag expression")]
    Empty,

    /// Parenthesized group is not closed, not opened, or nested.
    #[error("malformed group in tag expression '{expression}'")]
    MalformedGroup {
        /// The offending expression.
        expression: String,
    },

    /// Group uses the wrong separator for its polarity.
    ///
    /// Positive groups must be `(a|b)`, negative groups must be `-(a&b)`.
    #[error(
        "invalid group separator in '{expression}': use (a|b) for any-of, -(a&b) for not-all"
    )]
    GroupSeparator {
        /// The offending expression.
        expression: String,
    },

    /// A group has fewer than two members or an empty member.
    #[error("tag group '{expression}' needs at least two non-empty members")]
    GroupMembers {
        /// The offending expression.
        expression: String,
    },

    /// A single tag contains a reserved character.
    #[error("invalid tag '{tag}' in expression '{expression}'")]
    InvalidTag {
        /// The offending tag text.
        tag: String,
        /// The expression it came from.
        expression: String,
    },
}

impl TagExpressionError {
    /// Creates a malformed group error.
    pub fn malformed_group(expression: impl Into<String>) -> Self {
        Self::MalformedGroup {
            expression: expression.into(),
        }
    }

    /// Creates a group separator error.
    pub fn group_separator(expression: impl Into<String>) -> Self {
        Self::GroupSeparator {
            expression: expression.into(),
        }
    }

    /// Creates a group member count error.
    pub fn group_members(expression: impl Into<String>) -> Self {
        Self::GroupMembers {
            expression: expression.into(),
        }
    }

    /// Creates an invalid tag error.
    pub fn invalid_tag(tag: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::InvalidTag {
            tag: tag.into(),
            expression: expression.into(),
        }
    }
}
