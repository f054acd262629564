// src/filing/query.rs
//! Path lookup and keyword search over a [`ParsedFiling`].

use crate::filing::model::{FilingSection, ParsedFiling};
use crate::oracle::{OracleGate, PathCandidate};
use crate::outline::{self, ItemId};
use crate::utils::error::QueryError;
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_SEGMENTS: usize = 3;

static ALIAS_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"part[\s_\-]*(?:iv|iii|ii|i|[1-4])\b|item[\s_\-]*\d{1,2}[a-c]?\b|signatures?")
        .expect("valid alias regex")
});

fn invalid(path: &str, reason: &str) -> QueryError {
    QueryError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Rejects structurally invalid paths: empty, with empty segments, or deeper
/// than Part.Item.Item. Segments may be separated by '.' or '/'.
pub fn validate_path(path: &str) -> Result<(), QueryError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(invalid(path, "path is empty"));
    }
    let segments: Vec<&str> = trimmed.split(|c| c == '.' || c == '/').collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(invalid(path, "path has an empty segment"));
    }
    if segments.len() > MAX_SEGMENTS {
        return Err(invalid(path, "path has more than three segments"));
    }
    Ok(())
}

/// Rewrites human-friendly aliases ("Part1.Item1A", "PART II / ITEM 7") to the
/// canonical form ("part_1.item_1a").
pub fn normalize_alias(path: &str) -> Option<String> {
    let lower = path.to_lowercase();
    let mut segments = Vec::new();
    for token in ALIAS_TOKEN_RE.find_iter(&lower) {
        let token = token.as_str();
        let canonical = if token.starts_with("part") {
            outline::normalize_part_id(token)?.as_str()
        } else {
            outline::normalize_item_id(token)?.as_str()
        };
        segments.push(canonical);
    }
    (!segments.is_empty()).then(|| segments.join("."))
}

/// Resolves a canonical path by direct traversal.
///
/// Accepts "item_7", "part_2.item_7", "part_1.item_1a" and the nested form
/// "part_1.item_1.item_1a". A Part alone names no section.
pub fn lookup_internal<'p>(parsed: &'p ParsedFiling, path: &str) -> Option<&'p FilingSection> {
    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
    let target: ItemId = match segments.as_slice() {
        [item] => outline::item(item)?,
        [first, item] => {
            let item = outline::item(item)?;
            match outline::part(first) {
                Some(part) if part == item.part() => item,
                Some(_) => return None,
                None => {
                    // item.child form
                    let parent = outline::item(first)?;
                    if item.parent() != Some(parent) {
                        return None;
                    }
                    item
                }
            }
        }
        [part, parent, item] => {
            let part = outline::part(part)?;
            let parent = outline::item(parent)?;
            let item = outline::item(item)?;
            if item.part() != part || item.parent() != Some(parent) {
                return None;
            }
            item
        }
        _ => return None,
    };
    parsed.find(target)
}

/// Every addressable section, in traversal order.
pub fn available_paths(parsed: &ParsedFiling) -> Vec<PathCandidate> {
    parsed
        .walk()
        .into_iter()
        .map(|(path, section)| PathCandidate {
            path,
            section_id: section.section_id.to_string(),
            title: section.title.clone(),
            description: section.description.clone(),
        })
        .collect()
}

/// Looks up a section by a loosely written path.
///
/// Canonical paths resolve directly. Anything else is offered to the oracle with
/// the available paths, then rewritten by alias substitution. Structurally invalid
/// paths are an error; a well-formed path matching nothing is `Ok(None)`.
pub async fn get_section_by_path<'p>(
    parsed: &'p ParsedFiling,
    path: &str,
    gate: &OracleGate<'_>,
    max_candidates: usize,
) -> Result<Option<&'p FilingSection>, QueryError> {
    validate_path(path)?;

    if let Some(section) = lookup_internal(parsed, path.trim()) {
        return Ok(Some(section));
    }

    if gate.is_available() {
        let candidates: Vec<PathCandidate> = available_paths(parsed).into_iter().take(max_candidates).collect();
        if !candidates.is_empty() {
            let mapped = gate
                .ask("resolve_path", |o| o.resolve_path(path, &candidates))
                .await
                .flatten();
            match mapped {
                Some(mapped) => match lookup_internal(parsed, &mapped) {
                    Some(section) => {
                        tracing::debug!("Oracle mapped '{}' to '{}'", path, mapped);
                        return Ok(Some(section));
                    }
                    None => tracing::warn!("Oracle mapped '{}' to unknown path '{}'", path, mapped),
                },
                None => tracing::debug!("Oracle found no match for '{}'", path),
            }
        }
    }

    let found = normalize_alias(path).and_then(|canonical| {
        tracing::debug!("Alias '{}' normalised to '{}'", path, canonical);
        lookup_internal(parsed, &canonical)
    });
    Ok(found)
}

/// Every section whose content contains at least one keyword, case-insensitively,
/// in Part then Item order.
pub fn find_sections_by_keywords<'p, S: AsRef<str>>(
    parsed: &'p ParsedFiling,
    keywords: &[S],
) -> Vec<(String, &'p FilingSection)> {
    let needles: Vec<String> = keywords
        .iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if needles.is_empty() {
        return Vec::new();
    }

    parsed
        .walk()
        .into_iter()
        .filter(|(_, section)| {
            let content = section.content.to_lowercase();
            needles.iter().any(|n| content.contains(n.as_str()))
        })
        .collect()
}
