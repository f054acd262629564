// src/extractors/section.rs
//! Narrative content of one claimed section, bounded by the start of the next.

use crate::config::ParserConfig;
use crate::extractors::structure::ValidClaim;
use crate::oracle::OracleGate;
use crate::outline::{self, ItemId};
use once_cell::sync::Lazy;
use regex::Regex;

// --- Boundary patterns (Lazy Static) ---
// "Item 7.", "ITEM 7A:", "Item 8" alone on its line, "Item 9 Changes in ..."
pub(crate) static ITEM_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*item[ \t]*(\d{1,2})([a-c])?(?:[ \t]*[\.:\-–—]|[ \t]*$|[ \t]+(?-i:[A-Z]))")
        .expect("Failed to compile ITEM_HEADER_RE")
});

// "PART II" on its own line, optionally followed by a short title
pub(crate) static PART_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*part[ \t]+(?:iv|iii|ii|i|[1-4])[ \t]*(?:[\.:\-–—][^\n]{0,60})?$")
        .expect("Failed to compile PART_HEADER_RE")
});

pub(crate) static SIGNATURES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*signatures?[ \t]*$").expect("Failed to compile SIGNATURES_RE")
});

// Item headers left inside raw markup, e.g. "<b>Item 8.</b>"
static MARKUP_ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<[^>]*>\s*item\s*(\d{1,2})\s*([a-c])?\b").expect("Failed to compile MARKUP_ITEM_RE")
});

const HINT_CHARS: usize = 50;

/// Byte offset of the `n`th character, or the length when `s` is shorter.
pub fn char_to_byte(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

/// The first `n` characters of `s`.
pub fn prefix_chars(s: &str, n: usize) -> &str {
    &s[..char_to_byte(s, n)]
}

/// Case-insensitive substring search returning a byte offset into `haystack`.
pub fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    // ASCII lowering keeps every byte offset in place.
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

fn title_pattern(title: &str) -> String {
    title
        .split_whitespace()
        .map(|word| regex::escape(word).replace('\'', "['’]?"))
        .collect::<Vec<_>>()
        .join(r"\s+")
}

/// Patterns locating an item's header when the claimed excerpt is not found.
fn start_patterns(item: ItemId) -> Vec<Regex> {
    let mut patterns = Vec::new();
    if item.is_signatures() {
        patterns.push(r"(?im)^[ \t]*signatures?[ \t]*$".to_string());
    } else {
        let number = regex::escape(&item.number().to_lowercase());
        patterns.push(format!(r"(?im)^[ \t]*item[ \t]*{}\b", number));
        patterns.push(format!(r"(?i)\bitem\s*{}\b", number));
    }
    patterns.push(format!("(?i){}", title_pattern(item.title())));
    if item.as_str() == "item_7" {
        patterns.push(r"(?i)\bmd&a\b".to_string());
    }
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn locate_start(chunk: &str, claim: &ValidClaim) -> Option<usize> {
    if let Some(offset) = claim.start_offset.filter(|&o| chunk.is_char_boundary(o)) {
        return Some(offset);
    }

    let hint = prefix_chars(claim.content_start.trim(), HINT_CHARS);
    if let Some(offset) = find_ci(chunk, hint) {
        tracing::debug!("Located {} by its excerpt at {}", claim.item, offset);
        return Some(offset);
    }

    let found = start_patterns(claim.item)
        .iter()
        .find_map(|re| re.find(chunk).map(|m| m.start()));
    if let Some(offset) = found {
        tracing::debug!("Located {} by pattern at {}", claim.item, offset);
    }
    found
}

fn header_item(number: &str, letter: Option<&str>) -> Option<ItemId> {
    outline::normalize_item_id(&format!("item_{}{}", number, letter.unwrap_or("")))
}

/// Offset in `window` of the first header belonging to another section.
///
/// The first line is skipped so the current section's own header never matches.
pub fn regex_boundary(window: &str, current: ItemId) -> Option<usize> {
    let search_from = window.find('\n').map_or(window.len(), |i| i + 1);
    let rest = &window[search_from..];
    let other = |item: Option<ItemId>| item.map_or(false, |i| i != current);

    let item_hit = ITEM_HEADER_RE.captures_iter(rest).find_map(|caps| {
        let item = header_item(caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str()));
        other(item).then(|| caps.get(0).map(|m| m.start())).flatten()
    });
    let markup_hit = MARKUP_ITEM_RE.captures_iter(rest).find_map(|caps| {
        let item = header_item(caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str()));
        other(item).then(|| caps.get(0).map(|m| m.start())).flatten()
    });
    let part_hit = PART_HEADER_RE.find(rest).map(|m| m.start());
    let signatures_hit = if current.is_signatures() {
        None
    } else {
        SIGNATURES_RE.find(rest).map(|m| m.start())
    };

    [item_hit, markup_hit, part_hit, signatures_hit]
        .into_iter()
        .flatten()
        .min()
        .map(|offset| search_from + offset)
}

/// Extracts the narrative text of `claim` from `chunk`.
///
/// Never fails: an unlocatable section degrades to a prefix of the chunk and an
/// unlocatable end to a fixed-size slice.
pub async fn extract_section_content(
    chunk: &str,
    claim: &ValidClaim,
    gate: &OracleGate<'_>,
    config: &ParserConfig,
) -> String {
    let item = claim.item;
    let Some(start) = locate_start(chunk, claim) else {
        tracing::warn!("Could not locate {} in its chunk, using chunk prefix", item);
        return prefix_chars(chunk, config.last_resort_len).trim().to_string();
    };

    let window = prefix_chars(&chunk[start..], config.section_window);

    if gate.is_available() && window.chars().count() > config.oracle_boundary_min_window {
        let prompt_window = prefix_chars(window, config.boundary_prompt_chars);
        let upcoming = outline::next_items(item, 3);
        let answer = gate
            .ask("locate_boundary", |o| o.locate_boundary(prompt_window, item, &upcoming))
            .await
            .flatten();
        if let Some(pos) = answer {
            let window_chars = prompt_window.chars().count();
            if pos > 0 && pos < window_chars {
                let content = prefix_chars(window, pos).trim();
                if content.chars().count() >= config.min_oracle_boundary_content {
                    tracing::debug!("Oracle boundary for {} at char {}", item, pos);
                    return content.to_string();
                }
            }
            tracing::warn!("Rejected oracle boundary {} for {} (window {} chars)", pos, item, window_chars);
        }
    }

    match regex_boundary(window, item) {
        Some(end) => {
            let content = window[..end].trim();
            if content.chars().count() < config.min_regex_boundary_content {
                tracing::debug!("Boundary for {} left {} chars, taking fixed slice", item, content.len());
                prefix_chars(window, config.short_section_fallback).trim().to_string()
            } else {
                content.to_string()
            }
        }
        None => {
            tracing::debug!("No boundary found for {}, keeping the whole window", item);
            window.trim().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::ScriptedOracle;

    fn claim(id: &str, excerpt: &str) -> ValidClaim {
        let item = outline::item(id).unwrap();
        ValidClaim {
            item,
            part: item.part(),
            title: item.title().to_string(),
            content_start: excerpt.to_string(),
            start_offset: None,
            estimated_length: 0,
            key_terms: vec![],
        }
    }

    fn mdna_chunk(prose_len: usize) -> String {
        let sentence = "Net premiums earned increased while losses and loss adjustment expenses declined. ";
        format!(
            "Item 6. [Reserved]\nItem 7. Management's Discussion and Analysis\n{}\nItem 8. Financial Statements\nConsolidated balance sheets follow.",
            sentence.repeat(prose_len / sentence.len() + 1)
        )
    }

    #[test]
    fn test_find_ci_and_char_helpers() {
        assert_eq!(find_ci("PART II\nItem 7. MD&A", "item 7."), Some(8));
        assert_eq!(find_ci("abc", ""), None);
        assert_eq!(prefix_chars("résumé", 3), "rés");
        assert_eq!(char_to_byte("ab", 10), 2);
    }

    #[test]
    fn test_regex_boundary_variants() {
        let item_7 = outline::item("item_7").unwrap();
        assert_eq!(regex_boundary("Item 7. MD&A\ntext\nItem 7A. Market", item_7), Some(18));
        assert_eq!(regex_boundary("Item 7. MD&A\ntext\nPART III\nmore", item_7), Some(18));
        assert_eq!(regex_boundary("Item 7. MD&A\ntext <b>Item 8.</b> rest", item_7), Some(18));
        // A repeated header for the same item is not a boundary.
        assert_eq!(regex_boundary("Item 7. MD&A\nItem 7. (continued)\ntext", item_7), None);
        assert_eq!(regex_boundary("Item 7. MD&A\nsee Item 8 of this report", item_7), None);
    }

    #[tokio::test]
    async fn test_fallback_stops_before_next_item() {
        let chunk = mdna_chunk(600);
        let content = extract_section_content(
            &chunk,
            &claim("item_7", "Item 7. Management's Discussion"),
            &OracleGate::disabled(),
            &ParserConfig::default(),
        )
        .await;
        assert!(content.starts_with("Item 7. Management's Discussion and Analysis"));
        assert!(content.contains("Net premiums earned"));
        assert!(!content.contains("Item 8."));
        assert!(!content.contains("balance sheets"));
        assert!(!content.contains("[Reserved]"));
    }

    #[tokio::test]
    async fn test_pattern_start_when_excerpt_missing() {
        let chunk = "Cover\nItem 1A. Risk Factors\nWe face many risks in our business that could harm results.\n\
                     Our reserves may prove inadequate and our investments may lose value over time.\nItem 1B. Unresolved Staff Comments\nNone.";
        let content = extract_section_content(
            chunk,
            &claim("item_1a", "words the oracle invented"),
            &OracleGate::disabled(),
            &ParserConfig::default(),
        )
        .await;
        assert!(content.starts_with("Item 1A. Risk Factors"));
        assert!(!content.contains("Unresolved"));
    }

    #[tokio::test]
    async fn test_unlocatable_section_returns_chunk_prefix() {
        let chunk = "Nothing here resembles the requested section.";
        let content = extract_section_content(
            chunk,
            &claim("item_9c", "missing"),
            &OracleGate::disabled(),
            &ParserConfig::default(),
        )
        .await;
        assert_eq!(content, chunk);
    }

    #[tokio::test]
    async fn test_degenerate_regex_result_takes_fixed_slice() {
        let chunk = format!(
            "Item 1B. Unresolved Staff Comments\nNone.\nItem 1C. Cybersecurity\n{}",
            "We maintain a cybersecurity program. ".repeat(200)
        );
        let config = ParserConfig::default();
        let content = extract_section_content(
            &chunk,
            &claim("item_1b", "Item 1B. Unresolved"),
            &OracleGate::disabled(),
            &config,
        )
        .await;
        let len = content.chars().count();
        assert!(len <= config.short_section_fallback && len > config.short_section_fallback - 10);
        assert!(content.contains("Item 1C"));
    }

    #[tokio::test]
    async fn test_oracle_boundary_accepted_when_substantial() {
        let chunk = mdna_chunk(1_500);
        let oracle = ScriptedOracle {
            boundary: Some(700),
            ..Default::default()
        };
        let config = ParserConfig::default();
        let gate = OracleGate::new(Some(&oracle), &config);
        let content = extract_section_content(&chunk, &claim("item_7", "Item 7. Management's"), &gate, &config).await;

        assert!(content.chars().count() <= 700);
        assert!(content.chars().count() >= config.min_oracle_boundary_content);
        assert!(content.starts_with("Item 7."));
        assert_eq!(gate.calls_made(), 1);
    }

    #[tokio::test]
    async fn test_degenerate_oracle_boundary_falls_back_to_regex() {
        let chunk = mdna_chunk(1_500);
        let oracle = ScriptedOracle {
            boundary: Some(100),
            ..Default::default()
        };
        let config = ParserConfig::default();
        let gate = OracleGate::new(Some(&oracle), &config);
        let content = extract_section_content(&chunk, &claim("item_7", "Item 7. Management's"), &gate, &config).await;

        assert!(content.chars().count() > 1_500);
        assert!(!content.contains("Item 8."));
    }
}
