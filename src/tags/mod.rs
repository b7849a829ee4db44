//! Tag filter: a pure evaluator deciding inclusion of an item by its tags.
//!
//! # Overview
//!
//! A filter is a list of [`TagExpression`]s; every expression must pass for
//! an item to be accepted. Supported forms:
//!
//! - `T` - tag must be present
//! - `-T` - tag must be absent
//! - `(A|B|...)` - at least one member present
//! - `-(A&B&...)` - rejected only if every member is present
//!
//! Any term may contain `*` wildcards. Terms and tags are compared after
//! [`normalize_tag`] (lowercase, spaces to underscores).
//!
//! # Example
//!
//! ```
//! use idfetch_core::tags::TagFilter;
//!
//! let filter = TagFilter::parse_all(["outdoor", "-(night&rain)"]).unwrap();
//! let tags = vec!["outdoor".to_string(), "night".to_string()];
//! assert!(!filter.is_filtered_out(&tags));
//! ```

mod error;
mod expression;

pub use error::TagExpressionError;
pub use expression::{TagExpression, TagPattern, normalize_tag};

/// Ordered list of expressions applied conjunctively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    expressions: Vec<TagExpression>,
}

impl TagFilter {
    /// Creates a filter from parsed expressions.
    #[must_use]
    pub fn new(expressions: Vec<TagExpression>) -> Self {
        Self { expressions }
    }

    /// Parses every expression string.
    ///
    /// # Errors
    ///
    /// Returns the first [`TagExpressionError`] encountered.
    pub fn parse_all<I, S>(raw: I) -> Result<Self, TagExpressionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let expressions = raw
            .into_iter()
            .map(|s| TagExpression::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { expressions })
    }

    /// Returns the parsed expressions.
    #[must_use]
    pub fn expressions(&self) -> &[TagExpression] {
        &self.expressions
    }

    /// Returns true if the filter has no expressions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    /// Returns true if every expression passes for `tags`.
    #[must_use]
    pub fn matches(&self, tags: &[String]) -> bool {
        matches(tags, &self.expressions)
    }

    /// Returns true if the item must be rejected.
    #[must_use]
    pub fn is_filtered_out(&self, tags: &[String]) -> bool {
        is_filtered_out(tags, &self.expressions)
    }
}

/// Returns true if every expression passes for `tags`. An empty list matches.
#[must_use]
pub fn matches(tags: &[String], expressions: &[TagExpression]) -> bool {
    expressions.iter().all(|expr| expr.passes(tags))
}

/// Returns true if some expression fails for `tags`.
#[must_use]
pub fn is_filtered_out(tags: &[String], expressions: &[TagExpression]) -> bool {
    !matches(tags, expressions)
}
