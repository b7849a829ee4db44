//! Destination filename building, length budgeting and existing-file lookup.
//!
//! Layout: `[prefix]<id>[_(<score>)][_<title>][_(<tags>)][_<quality>]<ext>`, each
//! bracketed part controlled by a [`NamingFlags`] bit.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;
use url::Url;

use super::constants::{DEFAULT_EXTENSION, MAX_FULL_PATH_LEN, TAG_SEPARATOR};
use crate::config::NamingFlags;
use crate::queue::ItemId;

/// Two underscores, two brackets and the longest quality label.
const EXTRA_LEN: usize = 2 + 2 + 5;

/// Placeholder tag segment for items without tags.
const NO_TAGS: &str = "no_tags";

/// Inputs for [`build_filename`].
#[derive(Debug, Clone, Copy)]
pub struct FilenameParts<'a> {
    /// Item id.
    pub id: ItemId,
    /// Raw title.
    pub title: &'a str,
    /// Sorted tags.
    pub tags: &'a [String],
    /// Score, when known.
    pub score: Option<i64>,
    /// Rating percentage, when known.
    pub rating: Option<u8>,
    /// Selected quality.
    pub quality: &'a str,
    /// Transfer link (extension source).
    pub link: &'a str,
}

/// Builds the destination filename so that `<folder>/<filename>` fits in
/// [`MAX_FULL_PATH_LEN`] characters.
///
/// The tag segment is cut at the rightmost separator until the path fits; if no
/// tag segment remains and the path is still too long, the leading id/score/title
/// part is truncated directly.
#[must_use]
pub fn build_filename(parts: &FilenameParts<'_>, folder: &Path, flags: NamingFlags, prefix: &str) -> String {
    let folder_len = folder.to_string_lossy().chars().count() + 1;
    let ext = extension_from_url(parts.link);

    let mut head = String::new();
    if flags.contains(NamingFlags::PREFIX) {
        head.push_str(prefix);
    }
    head.push_str(&parts.id.to_string());
    if flags.contains(NamingFlags::SCORE) {
        head.push_str(&format!("_({})", score_segment(parts.score, parts.rating)));
    }
    let title = sanitize_filename_component(parts.title);
    if flags.contains(NamingFlags::TITLE) && !title.is_empty() {
        head.push('_');
        head.push_str(&title);
    }

    let budget = |used: usize| MAX_FULL_PATH_LEN.saturating_sub(folder_len + used + ext.len() + EXTRA_LEN);

    let mut tags = if flags.contains(NamingFlags::TAGS) {
        tag_segment(parts.tags)
    } else {
        String::new()
    };
    while tags.chars().count() > budget(head.chars().count()) {
        let cut = tags.rfind(TAG_SEPARATOR).unwrap_or(0);
        tags.truncate(cut);
    }
    if !tags.is_empty() {
        head.push_str(&format!("_({tags})"));
    } else if head.chars().count() > budget(0) {
        head = head.chars().take(budget(0)).collect();
    }
    let head = head.trim();

    let quality = if flags.contains(NamingFlags::QUALITY) {
        format!("_{}", parts.quality)
    } else {
        String::new()
    };

    format!("{head}{quality}{ext}")
}

/// Formats the score/rating segment: `+12, 85%`, `+12`, `85%` or `unk`.
#[must_use]
pub fn score_segment(score: Option<i64>, rating: Option<u8>) -> String {
    match (score, rating) {
        (Some(score), Some(rating)) => format!("{}, {rating}%", signed(score)),
        (Some(score), None) => signed(score),
        (None, Some(rating)) => format!("{rating}%"),
        (None, None) => "unk".to_string(),
    }
}

fn signed(score: i64) -> String {
    if score >= 0 {
        format!("+{score}")
    } else {
        score.to_string()
    }
}

fn tag_segment(tags: &[String]) -> String {
    if tags.is_empty() {
        return NO_TAGS.to_string();
    }
    tags.iter()
        .map(|tag| sanitize_filename_component(tag))
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>()
        .join(&TAG_SEPARATOR.to_string())
}

/// Returns the lowercase extension (with leading dot) of the link's last path
/// segment, or `.mp4`.
#[must_use]
pub fn extension_from_url(url: &str) -> String {
    let from_url = || {
        let parsed = Url::parse(url).ok()?;
        let last_segment = parsed.path_segments()?.next_back()?;
        let dot_index = last_segment.rfind('.')?;
        let ext = &last_segment[dot_index..];
        if ext.len() <= 1 || ext.len() > 6 || !ext[1..].chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(ext.to_lowercase())
    };
    from_url().unwrap_or_else(|| format!(".{DEFAULT_EXTENSION}"))
}

/// Replaces path-hostile characters with `_`, collapsing runs.
#[must_use]
pub fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\'' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ',' | '(' | ')' | '+' | '%') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches(|c| c == '_' || c == '.').to_string()
}

/// Builds the pattern recognizing any stored file of `id` (and `quality`, when
/// the quality flag is on) regardless of title or tag rendering.
///
/// # Errors
///
/// Returns a regex build error; the inputs are escaped so this does not happen
/// in practice.
pub fn existing_file_pattern(
    id: ItemId,
    quality: &str,
    flags: NamingFlags,
    prefix: &str,
) -> Result<Regex, regex::Error> {
    Regex::new(&stored_name_pattern(&id.to_string(), quality, flags, prefix))
}

fn stored_name_pattern(id: &str, quality: &str, flags: NamingFlags, prefix: &str) -> String {
    let prefix = regex::escape(prefix);
    if flags.contains(NamingFlags::QUALITY) {
        let quality = regex::escape(quality);
        format!(r"^(?:{prefix})?{id}(?:_.*)?_{quality}\.[A-Za-z0-9]+$")
    } else {
        format!(r"^(?:{prefix})?{id}(?:_.*)?\.[A-Za-z0-9]+$")
    }
}

/// Drops ids that already have a stored file in `base` or its direct
/// subfolders, keeping the order of the rest.
///
/// One directory listing serves every id, so this runs before any network
/// call. Returns the remaining ids and how many were dropped.
///
/// # Errors
///
/// Returns a regex build error; see [`existing_file_pattern`].
pub fn prefilter_stored(
    ids: &[ItemId],
    base: &Path,
    quality: &str,
    flags: NamingFlags,
    prefix: &str,
) -> Result<(Vec<ItemId>, usize), regex::Error> {
    let pattern = Regex::new(&stored_name_pattern(r"(\d+)", quality, flags, prefix))?;
    let stored: std::collections::HashSet<ItemId> = listing_dirs(base)
        .iter()
        .flat_map(|dir| files_in(dir))
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            pattern.captures(&name)?.get(1)?.as_str().parse::<ItemId>().ok()
        })
        .collect();
    let remaining: Vec<ItemId> = ids.iter().copied().filter(|id| !stored.contains(id)).collect();
    let removed = ids.len() - remaining.len();
    debug!(removed, remaining = remaining.len(), "prefiltered stored items");
    Ok((remaining, removed))
}

/// `base` followed by its direct subfolders, sorted.
fn listing_dirs(base: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![base.to_path_buf()];
    if let Ok(entries) = std::fs::read_dir(base) {
        let mut subdirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        subdirs.sort();
        dirs.extend(subdirs);
    }
    dirs
}

/// Sorted regular files directly inside `dir`.
fn files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}

/// Looks for a stored file matching `pattern` in `base` and its direct subfolders.
///
/// `preferred` is returned when it exists and matches, so an exact hit wins
/// over a similar one elsewhere.
#[must_use]
pub fn find_existing_file(base: &Path, pattern: &Regex, preferred: &Path) -> Option<PathBuf> {
    if preferred.is_file()
        && preferred
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| pattern.is_match(n))
    {
        return Some(preferred.to_path_buf());
    }

    for dir in listing_dirs(base) {
        if let Some(found) = files_in(&dir).into_iter().find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| pattern.is_match(n))
        }) {
            debug!(path = %found.display(), "found existing file");
            return Some(found);
        }
    }
    None
}
