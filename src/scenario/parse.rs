//! Parser for scenario strings.
//!
//! Format: `"<sub1>: <args...>; <sub2>: <args...>"`. Args are tag expressions
//! plus the options `-quality <q>`, `-minscore <int>`, `-minrating <0-100>`,
//! `-utp <nofilters|always>` and `-seq <id,id,...>`.

use std::collections::{BTreeSet, HashSet};

use super::error::ScenarioParseError;
use super::{Scenario, Subquery, UntaggedPolicy};
use crate::download::QUALITIES;
use crate::queue::ItemId;
use crate::tags::{TagExpression, TagFilter};

const OPT_QUALITY: &str = "-quality";
const OPT_MIN_SCORE: &str = "-minscore";
const OPT_MIN_RATING: &str = "-minrating";
const OPT_UTP: &str = "-utp";
const OPT_SEQ: &str = "-seq";

/// Parses a full scenario string.
///
/// `default_quality` is used by subqueries that do not set `-quality`.
///
/// # Errors
///
/// Returns the first [`ScenarioParseError`] found.
pub fn parse_scenario(raw: &str, default_quality: &str) -> Result<Scenario, ScenarioParseError> {
    let mut subqueries: Vec<Subquery> = Vec::new();
    let mut subfolders = HashSet::new();

    for chunk in raw.split(';').map(str::trim).filter(|c| !c.is_empty()) {
        let subquery = parse_subquery(chunk, default_quality)?;
        if !subfolders.insert(subquery.subfolder.clone()) {
            return Err(ScenarioParseError::DuplicateSubfolder {
                subfolder: subquery.subfolder,
            });
        }
        if subquery.untagged_policy == UntaggedPolicy::Always
            && let Some(first) = subqueries
                .iter()
                .find(|sq| sq.untagged_policy == UntaggedPolicy::Always)
        {
            return Err(ScenarioParseError::MultipleUntaggedFallbacks {
                first: first.subfolder.clone(),
                second: subquery.subfolder,
            });
        }
        subqueries.push(subquery);
    }

    if subqueries.is_empty() {
        return Err(ScenarioParseError::Empty);
    }
    Ok(Scenario::new(subqueries))
}

fn parse_subquery(chunk: &str, default_quality: &str) -> Result<Subquery, ScenarioParseError> {
    let (head, body) = chunk
        .split_once(':')
        .ok_or_else(|| ScenarioParseError::MissingSubfolder {
            subquery: chunk.to_string(),
        })?;
    let subfolder = head.trim().trim_end_matches('/').to_string();
    if subfolder.is_empty() || subfolder.contains(char::is_whitespace) {
        return Err(ScenarioParseError::MissingSubfolder {
            subquery: chunk.to_string(),
        });
    }

    let mut quality: Option<String> = None;
    let mut min_score: Option<i64> = None;
    let mut min_rating: Option<u8> = None;
    let mut untagged_policy: Option<UntaggedPolicy> = None;
    let mut ids: Option<BTreeSet<ItemId>> = None;
    let mut expressions = Vec::new();

    let mut tokens = body.split_whitespace();
    while let Some(token) = tokens.next() {
        let option = match token {
            OPT_QUALITY => OPT_QUALITY,
            OPT_MIN_SCORE => OPT_MIN_SCORE,
            OPT_MIN_RATING => OPT_MIN_RATING,
            OPT_UTP => OPT_UTP,
            OPT_SEQ => OPT_SEQ,
            _ => {
                let expression = TagExpression::parse(token)
                    .map_err(|e| ScenarioParseError::tag(&subfolder, e))?;
                expressions.push(expression);
                continue;
            }
        };
        let value = tokens
            .next()
            .ok_or_else(|| ScenarioParseError::missing_value(&subfolder, option))?;
        let invalid = || ScenarioParseError::invalid_value(&subfolder, option, value);

        let already_set = match option {
            OPT_QUALITY => {
                if !QUALITIES.contains(&value) {
                    return Err(invalid());
                }
                quality.replace(value.to_string()).is_some()
            }
            OPT_MIN_SCORE => {
                let parsed = value.parse::<i64>().map_err(|_| invalid())?;
                min_score.replace(parsed).is_some()
            }
            OPT_MIN_RATING => {
                let parsed = value
                    .parse::<u8>()
                    .ok()
                    .filter(|r| *r <= 100)
                    .ok_or_else(invalid)?;
                min_rating.replace(parsed).is_some()
            }
            OPT_SEQ => {
                let parsed = parse_id_list(value).ok_or_else(invalid)?;
                ids.replace(parsed).is_some()
            }
            _ => {
                let parsed = value.parse::<UntaggedPolicy>().map_err(|()| invalid())?;
                untagged_policy.replace(parsed).is_some()
            }
        };
        if already_set {
            return Err(ScenarioParseError::duplicate_option(&subfolder, option));
        }
    }

    Ok(Subquery {
        subfolder,
        quality: quality.unwrap_or_else(|| default_quality.to_string()),
        extra_tags: TagFilter::new(expressions),
        min_score,
        min_rating,
        untagged_policy: untagged_policy.unwrap_or_default(),
        ids,
    })
}

/// Parses `"3,7,12"`; empty entries and non-numeric ids make the list invalid.
fn parse_id_list(value: &str) -> Option<BTreeSet<ItemId>> {
    value
        .split(',')
        .map(|part| part.trim().parse::<ItemId>().ok())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_scenario() {
        let scenario = parse_scenario(
            "1g: solo -night -quality 480p; 2g: (duo|pair) -quality 720p -minscore 150 -utp always",
            "360p",
        )
        .unwrap();
        let sq = scenario.subqueries();
        assert_eq!(sq.len(), 2);

        assert_eq!(sq[0].subfolder, "1g");
        assert_eq!(sq[0].quality, "480p");
        assert_eq!(sq[0].extra_tags.expressions().len(), 2);
        assert_eq!(sq[0].min_score, None);
        assert_eq!(sq[0].untagged_policy, UntaggedPolicy::NoFilters);

        assert_eq!(sq[1].subfolder, "2g");
        assert_eq!(sq[1].quality, "720p");
        assert_eq!(sq[1].min_score, Some(150));
        assert_eq!(sq[1].untagged_policy, UntaggedPolicy::Always);
    }

    #[test]
    fn test_parse_uses_default_quality_and_min_rating() {
        let scenario = parse_scenario("a: x -minrating 80", "1080p").unwrap();
        let sq = &scenario.subqueries()[0];
        assert_eq!(sq.quality, "1080p");
        assert_eq!(sq.min_rating, Some(80));
    }

    #[test]
    fn test_parse_ignores_empty_chunks_and_trailing_slash() {
        let scenario = parse_scenario(" ; sub/: x ;", "360p").unwrap();
        assert_eq!(scenario.subqueries().len(), 1);
        assert_eq!(scenario.subqueries()[0].subfolder, "sub");
    }

    #[test]
    fn test_parse_seq_id_list() {
        let scenario = parse_scenario("a: x -seq 12,3,12; b: y", "360p").unwrap();
        let sq = scenario.subqueries();
        assert_eq!(sq[0].ids, Some(BTreeSet::from([3, 12])));
        assert_eq!(sq[1].ids, None);
        assert!(sq[0].covers(3));
        assert!(!sq[0].covers(4));
        assert!(sq[1].covers(4));
    }

    #[test]
    fn test_parse_rejects_bad_seq() {
        for raw in ["a: x -seq 1,,2", "a: x -seq one", "a: x -seq -3"] {
            assert!(matches!(
                parse_scenario(raw, "360p"),
                Err(ScenarioParseError::InvalidValue { option: "-seq", .. })
            ));
        }
        assert!(matches!(
            parse_scenario("a: x -seq 1 -seq 2", "360p"),
            Err(ScenarioParseError::DuplicateOption { option: "-seq", .. })
        ));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(parse_scenario(" ; ", "360p"), Err(ScenarioParseError::Empty));
    }

    #[test]
    fn test_parse_rejects_missing_subfolder() {
        assert!(matches!(
            parse_scenario("tag1 tag2", "360p"),
            Err(ScenarioParseError::MissingSubfolder { .. })
        ));
        assert!(matches!(
            parse_scenario(": tag1", "360p"),
            Err(ScenarioParseError::MissingSubfolder { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_option_values() {
        assert!(matches!(
            parse_scenario("a: x -quality 999p", "360p"),
            Err(ScenarioParseError::InvalidValue { option: "-quality", .. })
        ));
        assert!(matches!(
            parse_scenario("a: x -minscore high", "360p"),
            Err(ScenarioParseError::InvalidValue { option: "-minscore", .. })
        ));
        assert!(matches!(
            parse_scenario("a: x -minrating 101", "360p"),
            Err(ScenarioParseError::InvalidValue { option: "-minrating", .. })
        ));
        assert!(matches!(
            parse_scenario("a: x -utp sometimes", "360p"),
            Err(ScenarioParseError::InvalidValue { option: "-utp", .. })
        ));
        assert!(matches!(
            parse_scenario("a: x -quality", "360p"),
            Err(ScenarioParseError::MissingValue { option: "-quality", .. })
        ));
    }

    #[test]
    fn test_parse_rejects_duplicates() {
        assert!(matches!(
            parse_scenario("a: x -minscore 1 -minscore 2", "360p"),
            Err(ScenarioParseError::DuplicateOption { .. })
        ));
        assert!(matches!(
            parse_scenario("a: x; a: y", "360p"),
            Err(ScenarioParseError::DuplicateSubfolder { .. })
        ));
        assert!(matches!(
            parse_scenario("a: x -utp always; b: y -utp always", "360p"),
            Err(ScenarioParseError::MultipleUntaggedFallbacks { .. })
        ));
    }

    #[test]
    fn test_parse_wraps_tag_errors_with_subfolder() {
        let err = parse_scenario("good: x; bad: (a&b)", "360p").unwrap_err();
        assert!(matches!(&err, ScenarioParseError::Tag { subfolder, .. } if subfolder == "bad"));
        assert!(err.to_string().contains("bad"));
    }
}
