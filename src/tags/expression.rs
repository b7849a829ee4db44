//! Single tag filter expressions and wildcard tag patterns.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use super::error::TagExpressionError;

const RESERVED: [char; 4] = ['(', ')', '|', '&'];

/// Normalizes a tag: trimmed, lowercase, inner spaces replaced by underscores.
#[must_use]
pub fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// One tag term, either literal or a `*` wildcard pattern.
///
/// A wildcard pattern is present in a tag set when at least one member matches
/// the whole pattern.
#[derive(Debug, Clone)]
pub struct TagPattern {
    text: String,
    wildcard: Option<Regex>,
}

impl TagPattern {
    /// Parses one normalized tag term.
    ///
    /// # Errors
    ///
    /// Returns [`TagExpressionError::InvalidTag`] when the term is empty, starts
    /// with `-` or contains a reserved group character.
    pub fn parse(raw: &str, expression: &str) -> Result<Self, TagExpressionError> {
        let text = normalize_tag(raw);
        if text.is_empty() || text.starts_with('-') || text.contains(RESERVED) {
            return Err(TagExpressionError::invalid_tag(raw, expression));
        }

        let wildcard = if text.contains('*') {
            let body = text
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            let regex = Regex::new(&format!("^{body}$"))
                .map_err(|_| TagExpressionError::invalid_tag(raw, expression))?;
            Some(regex)
        } else {
            None
        };

        Ok(Self { text, wildcard })
    }

    /// Returns the normalized term text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns true if the term is present in `tags`.
    #[must_use]
    pub fn is_present(&self, tags: &[String]) -> bool {
        match &self.wildcard {
            Some(regex) => tags.iter().any(|tag| regex.is_match(tag)),
            None => tags.iter().any(|tag| *tag == self.text),
        }
    }
}

impl PartialEq for TagPattern {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for TagPattern {}

/// One filter expression. Every expression of a filter must pass for an item
/// to be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagExpression {
    /// `T`: the tag must be present.
    Require(TagPattern),
    /// `-T`: the tag must be absent.
    Exclude(TagPattern),
    /// `(A|B|...)`: at least one member must be present.
    AnyOf(Vec<TagPattern>),
    /// `-(A&B&...)`: rejects only when every member is present.
    NotAll(Vec<TagPattern>),
}

impl TagExpression {
    /// Parses one expression.
    ///
    /// # Errors
    ///
    /// Returns a [`TagExpressionError`] describing the first syntax problem.
    pub fn parse(raw: &str) -> Result<Self, TagExpressionError> {
        let expression = raw.trim();
        if expression.is_empty() {
            return Err(TagExpressionError::Empty);
        }

        let (negated, body) = match expression.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, expression),
        };

        if let Some(inner) = body.strip_prefix('(') {
            let inner = inner
                .strip_suffix(')')
                .ok_or_else(|| TagExpressionError::malformed_group(expression))?;
            if inner.contains(['(', ')']) {
                return Err(TagExpressionError::malformed_group(expression));
            }
            let (wanted, other) = if negated { ('&', '|') } else { ('|', '&') };
            if inner.contains(other) {
                return Err(TagExpressionError::group_separator(expression));
            }
            let members = inner.split(wanted).collect::<Vec<_>>();
            if members.len() < 2 || members.iter().any(|m| m.trim().is_empty()) {
                return Err(TagExpressionError::group_members(expression));
            }
            let patterns = members
                .into_iter()
                .map(|member| TagPattern::parse(member, expression))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(if negated {
                Self::NotAll(patterns)
            } else {
                Self::AnyOf(patterns)
            });
        }

        if body.contains(')') {
            return Err(TagExpressionError::malformed_group(expression));
        }
        let pattern = TagPattern::parse(body, expression)?;
        Ok(if negated {
            Self::Exclude(pattern)
        } else {
            Self::Require(pattern)
        })
    }

    /// Returns true if `tags` satisfies this expression.
    #[must_use]
    pub fn passes(&self, tags: &[String]) -> bool {
        match self {
            Self::Require(pattern) => pattern.is_present(tags),
            Self::Exclude(pattern) => !pattern.is_present(tags),
            Self::AnyOf(patterns) => patterns.iter().any(|p| p.is_present(tags)),
            Self::NotAll(patterns) => !patterns.iter().all(|p| p.is_present(tags)),
        }
    }
}

impl FromStr for TagExpression {
    type Err = TagExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TagExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |patterns: &[TagPattern], sep: &str| {
            patterns
                .iter()
                .map(TagPattern::as_str)
                .collect::<Vec<_>>()
                .join(sep)
        };
        match self {
            Self::Require(p) => write!(f, "{}", p.as_str()),
            Self::Exclude(p) => write!(f, "-{}", p.as_str()),
            Self::AnyOf(ps) => write!(f, "({})", join(ps, "|")),
            Self::NotAll(ps) => write!(f, "-({})", join(ps, "&")),
        }
    }
}
