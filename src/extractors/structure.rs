// src/extractors/structure.rs
//! Maps chunks of filing text onto the outline.

use crate::config::ParserConfig;
use crate::extractors::section::{prefix_chars, ITEM_HEADER_RE, PART_HEADER_RE, SIGNATURES_RE};
use crate::oracle::{ChunkAnalysis, OracleGate};
use crate::outline::{self, ItemId, PartId};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

static LABEL_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:item\s*\d{1,2}[a-c]?|signatures?)\s*[\.:\-–—]?\s*").expect("valid label regex")
});

const MAX_EXCERPT_CHARS: usize = 80;

/// A section claim whose identifiers have been checked against the outline.
#[derive(Debug, Clone)]
pub struct ValidClaim {
    pub item: ItemId,
    pub part: PartId,
    pub title: String,
    /// Excerpt marking where the section begins.
    pub content_start: String,
    /// Byte offset of the section header in the chunk, when known exactly.
    pub start_offset: Option<usize>,
    pub estimated_length: usize,
    pub key_terms: Vec<String>,
}

/// Drops claims outside the outline and repairs their Part, keeping the first claim
/// for each item.
pub fn validate_claims(analysis: ChunkAnalysis) -> Vec<ValidClaim> {
    let mut seen = HashSet::new();
    let mut claims = Vec::new();

    for claim in analysis.sections_found {
        let Some(item) = outline::normalize_item_id(&claim.section_id) else {
            tracing::warn!("Ignoring claim for unknown section '{}'", claim.section_id);
            continue;
        };
        if !seen.insert(item) {
            tracing::debug!("Ignoring repeated claim for {} within one chunk", item);
            continue;
        }
        let part = item.part();
        if outline::normalize_part_id(&claim.part) != Some(part) {
            tracing::debug!("Claim for {} named part '{}', using {}", item, claim.part, part);
        }
        let title = claim.title.trim();
        claims.push(ValidClaim {
            item,
            part,
            title: if title.is_empty() { item.title().to_string() } else { title.to_string() },
            content_start: claim.content_start,
            start_offset: None,
            estimated_length: claim.content_length,
            key_terms: claim.contains_key_info,
        });
    }
    claims
}

struct HeaderHit {
    offset: usize,
    item: Option<ItemId>,
}

fn header_hits(chunk: &str) -> Vec<HeaderHit> {
    let mut hits = Vec::new();
    for caps in ITEM_HEADER_RE.captures_iter(chunk) {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else { continue };
        let letter = caps.get(2).map_or("", |m| m.as_str());
        let item = outline::normalize_item_id(&format!("item_{}{}", number.as_str(), letter));
        hits.push(HeaderHit { offset: whole.start(), item });
    }
    for m in SIGNATURES_RE.find_iter(chunk) {
        hits.push(HeaderHit { offset: m.start(), item: outline::item("signatures") });
    }
    for m in PART_HEADER_RE.find_iter(chunk) {
        hits.push(HeaderHit { offset: m.start(), item: None });
    }
    hits.sort_by_key(|h| h.offset);
    hits
}

/// Deterministic locator: claims every line-leading Item or Signatures header.
///
/// When an item's header occurs more than once (a leftover contents listing, a
/// running header) the occurrence followed by the most text wins.
pub fn scan_headers(chunk: &str) -> Vec<ValidClaim> {
    let hits = header_hits(chunk);
    let mut best: HashMap<ItemId, (usize, usize)> = HashMap::new();

    for (i, hit) in hits.iter().enumerate() {
        let Some(item) = hit.item else { continue };
        let end = hits.get(i + 1).map_or(chunk.len(), |next| next.offset);
        let span = end - hit.offset;
        let entry = best.entry(item).or_insert((hit.offset, end));
        if span > entry.1 - entry.0 {
            *entry = (hit.offset, end);
        }
    }

    let mut claims: Vec<ValidClaim> = best
        .into_iter()
        .map(|(item, (start, end))| {
            let span = &chunk[start..end];
            let header = span.lines().next().unwrap_or("").trim();
            let label_end = LABEL_PREFIX_RE.find(header).map_or(0, |m| m.end());
            let title = header[label_end..].trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
            let lower_span = span.to_lowercase();
            let key_terms = item
                .key_metrics()
                .iter()
                .filter(|term| lower_span.contains(*term))
                .map(|term| term.to_string())
                .collect();

            ValidClaim {
                item,
                part: item.part(),
                title: if title.is_empty() { item.title().to_string() } else { title.to_string() },
                content_start: prefix_chars(header, MAX_EXCERPT_CHARS).to_string(),
                start_offset: Some(start),
                estimated_length: span.chars().count(),
                key_terms,
            }
        })
        .collect();

    claims.sort_by_key(|c| c.start_offset);
    claims
}

/// Identifies the sections present in one chunk.
///
/// With `use_oracle` and an open gate the oracle decides; a failed oracle call skips
/// the chunk (`None`). Otherwise the deterministic header scan is used.
pub async fn map_chunk(
    chunk: &str,
    index: usize,
    gate: &OracleGate<'_>,
    use_oracle: bool,
    config: &ParserConfig,
) -> Option<Vec<ValidClaim>> {
    if use_oracle && gate.is_available() {
        let sample = prefix_chars(chunk, config.oracle_chunk_chars);
        return match gate.ask("locate_sections", |o| o.locate_sections(sample, index)).await {
            Some(analysis) => {
                tracing::debug!("Chunk {}: {}", index + 1, analysis.chunk_summary);
                let claims = validate_claims(analysis);
                tracing::info!("Chunk {}: oracle found {} section(s)", index + 1, claims.len());
                Some(claims)
            }
            None => {
                tracing::warn!("Skipping chunk {}: section mapping failed", index + 1);
                None
            }
        };
    }

    let claims = scan_headers(chunk);
    tracing::info!("Chunk {}: header scan found {} section(s)", index + 1, claims.len());
    Some(claims)
}
