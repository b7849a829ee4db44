//! Scenario routing and item classification.
//!
//! Decides, before any transfer starts, whether an item is accepted and which
//! destination subfolder and quality it gets.
//!
//! # Overview
//!
//! - [`Subquery`] - one routing rule (subfolder, quality, tag filter, score
//!   floors, optional id list)
//! - [`Scenario`] - ordered subqueries; the first match wins
//! - [`GlobalPolicy`] - outer settings applied when no scenario is configured
//!   (and as a pre-filter when one is)
//! - [`Classifier`] - combines both into a single [`Classification`]
//!
//! # Example
//!
//! ```
//! use idfetch_core::scenario::parse_scenario;
//!
//! let scenario = parse_scenario("solo: solo -quality 720p; rest: -solo", "360p").unwrap();
//! let tags = vec!["solo".to_string()];
//! let chosen = scenario.route(7, &tags, true, None, None).unwrap();
//! assert_eq!(chosen.subfolder, "solo");
//! ```

mod error;
mod parse;

pub use error::ScenarioParseError;
pub use parse::parse_scenario;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::queue::{ItemId, ItemRecord};
use crate::tags::TagFilter;

/// Policy for items whose tags could not be extracted at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UntaggedPolicy {
    /// Untagged items are rejected whenever tag filters are in use.
    #[default]
    NoFilters,
    /// Untagged items are always accepted.
    Always,
}

impl UntaggedPolicy {
    /// Returns the command-line spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoFilters => "nofilters",
            Self::Always => "always",
        }
    }
}

impl FromStr for UntaggedPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nofilters" => Ok(Self::NoFilters),
            "always" => Ok(Self::Always),
            _ => Err(()),
        }
    }
}

impl fmt::Display for UntaggedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One scenario rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subquery {
    /// Destination partition relative to the base path.
    pub subfolder: String,
    /// Quality tier to request.
    pub quality: String,
    /// Tag expressions the item must satisfy.
    pub extra_tags: TagFilter,
    /// Minimum score; unknown scores always pass.
    pub min_score: Option<i64>,
    /// Minimum rating percentage; unknown ratings always pass.
    pub min_rating: Option<u8>,
    /// Whether this rule is the fallback for untagged items.
    pub untagged_policy: UntaggedPolicy,
    /// Ids this rule is limited to (`-seq`); `None` covers every id.
    pub ids: Option<BTreeSet<ItemId>>,
}

impl Subquery {
    /// Returns true if `id` is within this rule's id list.
    #[must_use]
    pub fn covers(&self, id: ItemId) -> bool {
        self.ids.as_ref().is_none_or(|ids| ids.contains(&id))
    }

    /// Returns true if the item satisfies this rule's tags and floors.
    #[must_use]
    pub fn accepts(&self, tags: &[String], score: Option<i64>, rating: Option<u8>) -> bool {
        !self.extra_tags.is_filtered_out(tags)
            && passes_floor(score, self.min_score)
            && passes_floor(rating, self.min_rating)
    }
}

/// Ordered rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    subqueries: Vec<Subquery>,
}

impl Scenario {
    /// Creates a scenario from subqueries in evaluation order.
    #[must_use]
    pub fn new(subqueries: Vec<Subquery>) -> Self {
        Self { subqueries }
    }

    /// Returns the subqueries in evaluation order.
    #[must_use]
    pub fn subqueries(&self) -> &[Subquery] {
        &self.subqueries
    }

    /// Returns the first subquery declaring the always-accept untagged policy.
    #[must_use]
    pub fn untagged_fallback(&self) -> Option<&Subquery> {
        self.subqueries
            .iter()
            .find(|sq| sq.untagged_policy == UntaggedPolicy::Always)
    }

    /// Picks the destination rule for an item.
    ///
    /// Returns the first subquery that covers `id` and accepts the item. When
    /// none does and the item is untagged (`tags_extracted == false`), the
    /// untagged fallback is returned if it covers `id`. `None` means the item
    /// is skipped.
    #[must_use]
    pub fn route(
        &self,
        id: ItemId,
        tags: &[String],
        tags_extracted: bool,
        score: Option<i64>,
        rating: Option<u8>,
    ) -> Option<&Subquery> {
        route(id, tags, tags_extracted, score, rating, self)
    }
}

/// Free-function form of [`Scenario::route`].
#[must_use]
pub fn route<'a>(
    id: ItemId,
    tags: &[String],
    tags_extracted: bool,
    score: Option<i64>,
    rating: Option<u8>,
    scenario: &'a Scenario,
) -> Option<&'a Subquery> {
    scenario
        .subqueries
        .iter()
        .find(|sq| sq.covers(id) && sq.accepts(tags, score, rating))
        .or_else(|| {
            if tags_extracted {
                None
            } else {
                scenario.untagged_fallback().filter(|sq| sq.covers(id))
            }
        })
}

/// Outer settings used without a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalPolicy {
    /// Flat tag filter; also a pre-filter when a scenario is set.
    pub extra_tags: TagFilter,
    /// Untagged item handling; ignored when a scenario is set.
    pub untagged_policy: UntaggedPolicy,
    /// Global score floor.
    pub min_score: Option<i64>,
    /// Global rating floor (percent).
    pub min_rating: Option<u8>,
    /// Requested quality; ignored when a scenario is set.
    pub quality: String,
}

/// Why an item was rejected during classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Failed the outer/global tag filter.
    ExtraTags,
    /// Known score below the floor.
    LowScore {
        /// Item score.
        score: i64,
        /// Required minimum.
        min: i64,
    },
    /// Known rating below the floor.
    LowRating {
        /// Item rating.
        rating: u8,
        /// Required minimum.
        min: u8,
    },
    /// Untagged item rejected by the untagged policy.
    Untagged,
    /// No subquery matched and no untagged fallback applied.
    NoMatchingSubquery,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtraTags => write!(f, "filtered out by extra tags"),
            Self::LowScore { score, min } => write!(f, "low score {score} (required {min})"),
            Self::LowRating { rating, min } => {
                write!(f, "low rating {rating}% (required {min}%)")
            }
            Self::Untagged => write!(f, "untagged, rejected by untagged policy"),
            Self::NoMatchingSubquery => write!(f, "no matching scenario subquery"),
        }
    }
}

/// Result of classifying one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Item accepted with its destination and quality.
    Accept {
        /// Destination subfolder.
        subfolder: String,
        /// Quality to request.
        quality: String,
    },
    /// Item filtered out.
    Reject(RejectReason),
}

/// Applies the global pre-filter and then either the scenario or the flat policy.
#[derive(Debug, Clone)]
pub struct Classifier {
    global: GlobalPolicy,
    scenario: Option<Scenario>,
}

impl Classifier {
    /// Creates a classifier.
    #[must_use]
    pub fn new(global: GlobalPolicy, scenario: Option<Scenario>) -> Self {
        Self { global, scenario }
    }

    /// Returns the configured scenario, if any.
    #[must_use]
    pub fn scenario(&self) -> Option<&Scenario> {
        self.scenario.as_ref()
    }

    /// Returns the outer policy.
    #[must_use]
    pub fn global(&self) -> &GlobalPolicy {
        &self.global
    }

    /// Classifies a resolved item.
    #[must_use]
    pub fn classify(&self, item: &ItemRecord) -> Classification {
        let global = &self.global;
        let tags = item.tags.as_slice();

        if item.tags_extracted && global.extra_tags.is_filtered_out(tags) {
            return Classification::Reject(RejectReason::ExtraTags);
        }
        if let (Some(score), Some(min)) = (item.score, global.min_score)
            && score < min
        {
            return Classification::Reject(RejectReason::LowScore { score, min });
        }
        if let (Some(rating), Some(min)) = (item.rating, global.min_rating)
            && rating < min
        {
            return Classification::Reject(RejectReason::LowRating { rating, min });
        }

        if let Some(scenario) = &self.scenario {
            return match scenario.route(item.id, tags, item.tags_extracted, item.score, item.rating) {
                Some(sq) => Classification::Accept {
                    subfolder: sq.subfolder.clone(),
                    quality: sq.quality.clone(),
                },
                None => Classification::Reject(RejectReason::NoMatchingSubquery),
            };
        }

        if !item.tags_extracted
            && !global.extra_tags.is_empty()
            && global.untagged_policy != UntaggedPolicy::Always
        {
            return Classification::Reject(RejectReason::Untagged);
        }

        Classification::Accept {
            subfolder: String::new(),
            quality: global.quality.clone(),
        }
    }
}

fn passes_floor<T: PartialOrd>(value: Option<T>, floor: Option<T>) -> bool {
    match (value, floor) {
        (Some(value), Some(floor)) => value >= floor,
        _ => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| (*t).to_string()).collect()
    }

    fn global(extra: &[&str]) -> GlobalPolicy {
        GlobalPolicy {
            extra_tags: TagFilter::parse_all(extra).unwrap(),
            untagged_policy: UntaggedPolicy::NoFilters,
            min_score: None,
            min_rating: None,
            quality: "360p".to_string(),
        }
    }

    fn item(tag_list: Option<&[&str]>, score: Option<i64>) -> ItemRecord {
        let mut item = ItemRecord::new(1, "360p");
        if let Some(list) = tag_list {
            item.set_tags(tags(list));
            item.tags_extracted = true;
        }
        item.score = score;
        item
    }

    #[test]
    fn test_route_first_match_wins() {
        // A accepts a superset of what B accepts
        let ab = parse_scenario("a: x; b: x y", "360p").unwrap();
        let ba = parse_scenario("b: x y; a: x", "360p").unwrap();
        let set = tags(&["x", "y"]);
        assert_eq!(ab.route(1, &set, true, None, None).unwrap().subfolder, "a");
        assert_eq!(ba.route(1, &set, true, None, None).unwrap().subfolder, "b");
    }

    #[test]
    fn test_route_respects_min_score_unknown_passes() {
        let scenario = parse_scenario("hi: x -minscore 100; lo: x", "360p").unwrap();
        let set = tags(&["x"]);
        assert_eq!(scenario.route(1, &set, true, Some(150), None).unwrap().subfolder, "hi");
        assert_eq!(scenario.route(1, &set, true, Some(50), None).unwrap().subfolder, "lo");
        assert_eq!(scenario.route(1, &set, true, None, None).unwrap().subfolder, "hi");
    }

    #[test]
    fn test_route_untagged_fallback_only_when_untagged() {
        let scenario = parse_scenario("a: x; any: y -utp always", "360p").unwrap();
        assert_eq!(scenario.route(1, &[], false, None, None).unwrap().subfolder, "any");
        // tagged item with zero tags does not take the fallback
        assert!(scenario.route(1, &[], true, None, None).is_none());
    }

    #[test]
    fn test_route_seq_limits_subquery_to_listed_ids() {
        let scenario = parse_scenario("picked: x -seq 5,9; rest: x", "360p").unwrap();
        let set = tags(&["x"]);
        assert_eq!(scenario.route(5, &set, true, None, None).unwrap().subfolder, "picked");
        assert_eq!(scenario.route(9, &set, true, None, None).unwrap().subfolder, "picked");
        assert_eq!(scenario.route(6, &set, true, None, None).unwrap().subfolder, "rest");
    }

    #[test]
    fn test_route_untagged_fallback_honors_seq() {
        let scenario = parse_scenario("a: x; any: -utp always -seq 3", "360p").unwrap();
        assert_eq!(scenario.route(3, &[], false, None, None).unwrap().subfolder, "any");
        assert!(scenario.route(4, &[], false, None, None).is_none());
    }

    #[test]
    fn test_route_none_when_nothing_matches() {
        let scenario = parse_scenario("a: x", "360p").unwrap();
        assert!(scenario.route(1, &tags(&["z"]), true, None, None).is_none());
    }

    #[test]
    fn test_classify_global_accepts_with_global_quality() {
        let classifier = Classifier::new(global(&["x"]), None);
        assert_eq!(
            classifier.classify(&item(Some(&["x"]), None)),
            Classification::Accept {
                subfolder: String::new(),
                quality: "360p".to_string()
            }
        );
    }

    #[test]
    fn test_classify_global_filters_by_tags() {
        let classifier = Classifier::new(global(&["x"]), None);
        assert_eq!(
            classifier.classify(&item(Some(&["y"]), None)),
            Classification::Reject(RejectReason::ExtraTags)
        );
    }

    #[test]
    fn test_classify_untagged_policy() {
        let untagged = item(None, None);

        let strict = Classifier::new(global(&["x"]), None);
        assert_eq!(
            strict.classify(&untagged),
            Classification::Reject(RejectReason::Untagged)
        );

        let mut always_policy = global(&["x"]);
        always_policy.untagged_policy = UntaggedPolicy::Always;
        let always = Classifier::new(always_policy, None);
        assert!(matches!(always.classify(&untagged), Classification::Accept { .. }));

        // no filters in use: untagged items pass
        let open = Classifier::new(global(&[]), None);
        assert!(matches!(open.classify(&untagged), Classification::Accept { .. }));
    }

    #[test]
    fn test_classify_score_and_rating_floors() {
        let mut policy = global(&[]);
        policy.min_score = Some(10);
        policy.min_rating = Some(50);
        let classifier = Classifier::new(policy, None);

        assert_eq!(
            classifier.classify(&item(Some(&[]), Some(5))),
            Classification::Reject(RejectReason::LowScore { score: 5, min: 10 })
        );
        let mut low_rating = item(Some(&[]), Some(20));
        low_rating.rating = Some(40);
        assert_eq!(
            classifier.classify(&low_rating),
            Classification::Reject(RejectReason::LowRating { rating: 40, min: 50 })
        );
        // unknown score passes
        assert!(matches!(
            classifier.classify(&item(Some(&[]), None)),
            Classification::Accept { .. }
        ));
    }

    #[test]
    fn test_classify_scenario_with_outer_prefilter() {
        let scenario = parse_scenario("a: x -quality 720p", "360p").unwrap();
        let classifier = Classifier::new(global(&["-banned"]), Some(scenario));

        assert_eq!(
            classifier.classify(&item(Some(&["x"]), None)),
            Classification::Accept {
                subfolder: "a".to_string(),
                quality: "720p".to_string()
            }
        );
        assert_eq!(
            classifier.classify(&item(Some(&["x", "banned"]), None)),
            Classification::Reject(RejectReason::ExtraTags)
        );
        assert_eq!(
            classifier.classify(&item(Some(&["y"]), None)),
            Classification::Reject(RejectReason::NoMatchingSubquery)
        );
    }

    #[test]
    fn test_untagged_policy_from_str() {
        assert_eq!("always".parse::<UntaggedPolicy>(), Ok(UntaggedPolicy::Always));
        assert_eq!(
            "nofilters".parse::<UntaggedPolicy>(),
            Ok(UntaggedPolicy::NoFilters)
        );
        assert!("ignore".parse::<UntaggedPolicy>().is_err());
    }
}
