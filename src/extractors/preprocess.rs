// src/extractors/preprocess.rs
//! Flattening of the tag tree and removal of front matter and tagging noise.

use crate::extractors::chunker::is_section_break;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html};

// Lines that indicate machine-readable tagging blocks (inline XBRL headers and the like)
const TAGGING_MARKERS: &[&str] = &[
    "context id=",
    "xbrl",
    "taxonomy",
    "namespace",
    "schema",
    "entity identifier",
];

// Lines that end a tagging block
const TAGGING_EXITS: &[&str] = &["part i", "item 1", "business", "table of contents"];

const ALT_OPENINGS: &[&str] = &["item 1. business", "part i - item 1", "the company operates"];

const DOMAIN_WORDS: &[&str] = &["company", "business", "operations", "insurance", "financial"];

const MIN_NARRATIVE_FOLLOWUP: usize = 80;
const FOLLOWUP_LINES: usize = 3;
const MAX_TOC_ENTRY_LEN: usize = 100;
const MAX_PREAMBLE_LINES: usize = 1_000;
const POSITION_SCAN_LINES: usize = 1_000;
const MIN_POSITION_LINE: usize = 50;

static ITEM_ONE_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:part\s+i\s*[-–—:,]?\s*)?item\s*1(?:[\.:\-–—\s]|$)").expect("valid item 1 regex")
});

/// Renders the document as plain text, one text node per line.
///
/// Whitespace inside a node is collapsed, empty nodes are dropped and the contents
/// of `script` and `style` elements are skipped.
pub fn flatten_text(document: &Html) -> String {
    let mut lines = Vec::new();
    collect_text(document.root_element(), &mut lines);
    lines.join("\n")
}

fn collect_text(element: ElementRef, out: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !line.is_empty() {
                    out.push(line);
                }
            }
            Node::Element(el) if matches!(el.name(), "script" | "style") => {}
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleaningStrategy {
    /// No boilerplate was detected; the text is returned as given.
    Untouched,
    /// Output starts at a detected narrative opening.
    NarrativeStart,
    /// Output starts at the first substantial line past the first fifth of the document.
    PositionFallback,
    /// Boilerplate was removed from the leading lines; past the scan limit the text
    /// is kept as given.
    Residual,
}

#[derive(Debug, Clone, Copy)]
pub struct PreprocessStats {
    /// Characters before cleaning.
    pub original_len: usize,
    pub cleaned_len: usize,
    pub strategy: CleaningStrategy,
}

impl PreprocessStats {
    pub fn removed(&self) -> usize {
        self.original_len.saturating_sub(self.cleaned_len)
    }
}

#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub text: String,
    pub stats: PreprocessStats,
}

fn is_toc_marker(lower: &str) -> bool {
    lower.starts_with("table of contents") || lower == "index" || lower == "contents"
}

/// An Item 1 header followed (within three lines) by a paragraph of real prose.
///
/// Headers split across table cells flatten to "Item 1." / "Business" / prose, so
/// short lines may sit between the header and the prose. Another section header
/// in between means a contents listing, not the narrative.
fn opens_item_one(lines: &[&str], i: usize, lower: &str) -> bool {
    if !ITEM_ONE_HEADER_RE.is_match(lower) {
        return false;
    }
    if lines[i].trim().chars().count() >= MIN_NARRATIVE_FOLLOWUP {
        return true;
    }
    for next in lines
        .iter()
        .skip(i + 1)
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .take(FOLLOWUP_LINES)
    {
        if is_section_break(next) {
            return false;
        }
        if next.chars().count() >= MIN_NARRATIVE_FOLLOWUP {
            return true;
        }
    }
    false
}

fn is_toc_entry(trimmed: &str) -> bool {
    trimmed.chars().any(|c| c.is_ascii_digit()) && trimmed.chars().count() < MAX_TOC_ENTRY_LEN
}

/// Strips tagging noise and front matter, keeping narrative prose.
///
/// Never fails. When nothing looks like boilerplate the input comes back unchanged.
/// Only the leading lines are scanned: once `MAX_PREAMBLE_LINES` lines of text have
/// been kept, a later contents marker is a running header and everything from there
/// on is kept as given.
pub fn preprocess(text: &str) -> Preprocessed {
    let lines: Vec<&str> = text.lines().collect();

    let mut in_tagging = false;
    let mut in_front_matter = false;
    let mut saw_boilerplate = false;
    let mut narrative_start: Option<usize> = None;
    let mut scan_end: Option<usize> = None;
    let mut preamble: Vec<&str> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if preamble.len() >= MAX_PREAMBLE_LINES {
            scan_end = Some(i);
            break;
        }
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();

        if TAGGING_MARKERS.iter().any(|m| lower.contains(m)) {
            in_tagging = true;
            saw_boilerplate = true;
            continue;
        }
        if in_tagging {
            if TAGGING_EXITS.iter().any(|m| lower.contains(m)) {
                in_tagging = false;
            } else {
                continue;
            }
        }

        if is_toc_marker(&lower) {
            in_front_matter = true;
            saw_boilerplate = true;
            continue;
        }

        if in_front_matter {
            if opens_item_one(&lines, i, &lower) {
                narrative_start = Some(i);
                break;
            }
            if is_toc_entry(trimmed) {
                continue;
            }
            if lower.contains("forward-looking statements") && trimmed.chars().count() > 20 {
                narrative_start = Some(i);
                break;
            }
            continue;
        }

        if ALT_OPENINGS.iter().any(|m| lower.contains(m)) && trimmed.chars().count() > 15 {
            narrative_start = Some(i);
            break;
        }
        preamble.push(line);
    }

    let (cleaned, strategy) = if !saw_boilerplate {
        (text.to_string(), CleaningStrategy::Untouched)
    } else if let Some(start) = narrative_start {
        (lines[start..].join("\n"), CleaningStrategy::NarrativeStart)
    } else if let Some(end) = scan_end {
        preamble.extend_from_slice(&lines[end..]);
        (preamble.join("\n"), CleaningStrategy::Residual)
    } else {
        tracing::warn!("Narrative start not detected, using position-based approach");
        match position_fallback(&lines) {
            Some(start) => (lines[start..].join("\n"), CleaningStrategy::PositionFallback),
            None => (text.to_string(), CleaningStrategy::Untouched),
        }
    };

    let stats = PreprocessStats {
        original_len: text.chars().count(),
        cleaned_len: cleaned.chars().count(),
        strategy,
    };
    tracing::info!(
        "Pre-processing: {} -> {} chars ({} removed, {:?})",
        stats.original_len,
        stats.cleaned_len,
        stats.removed(),
        stats.strategy
    );

    Preprocessed { text: cleaned, stats }
}

fn position_fallback(lines: &[&str]) -> Option<usize> {
    let start = lines.len() / 5;
    let end = (start + POSITION_SCAN_LINES).min(lines.len());
    (start..end).find(|&i| {
        let trimmed = lines[i].trim();
        let lower = trimmed.to_lowercase();
        trimmed.chars().count() > MIN_POSITION_LINE && DOMAIN_WORDS.iter().any(|w| lower.contains(w))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROSE: &str = "The Company is a leading provider of property and casualty insurance products \
                         to businesses and individuals across the United States.";

    #[test]
    fn test_flatten_text_one_node_per_line() {
        let html = Html::parse_document(
            "<html><head><style>p { color: red }</style><script>var x = 1;</script></head>\
             <body><p>Item 1.\u{a0}  Business</p><div><span>First</span>\n<span>  </span><b>Second</b></div></body></html>",
        );
        assert_eq!(flatten_text(&html), "Item 1. Business\nFirst\nSecond");
    }

    #[test]
    fn test_clean_text_is_returned_unchanged() {
        let text = format!("Annual overview\nItem 1. Business\n{}\nItem 1A. Risk Factors\nRisks.", PROSE);
        let out = preprocess(&text);
        assert_eq!(out.text, text);
        assert_eq!(out.stats.strategy, CleaningStrategy::Untouched);
        assert_eq!(out.stats.removed(), 0);
    }

    #[test]
    fn test_front_matter_and_tagging_are_removed() {
        let text = format!(
            "dei:EntityCentralIndexKey xbrl context id=c-1\n0000874766\nFY\n\
             UNITED STATES SECURITIES AND EXCHANGE COMMISSION\n\
             Table of Contents\nPART I\nItem 1. Business 5\nItem 1A. Risk Factors 21\nItem 7. MD&A 45\n\
             PART I\nItem 1. Business\n{}\nMore prose follows.",
            PROSE
        );
        let out = preprocess(&text);
        assert_eq!(out.stats.strategy, CleaningStrategy::NarrativeStart);
        assert!(out.text.starts_with("Item 1. Business\nThe Company is a leading provider"));
        assert!(!out.text.contains("Risk Factors 21"));
        assert!(out.stats.cleaned_len < out.stats.original_len);
    }

    #[test]
    fn test_forward_looking_statements_open_narrative() {
        let text = "Table of Contents\nBusiness 3\nRisk Factors 12\n\
                    Cautionary note regarding forward-looking statements\nWe caution readers.";
        let out = preprocess(text);
        assert_eq!(out.stats.strategy, CleaningStrategy::NarrativeStart);
        assert_eq!(out.text, "Cautionary note regarding forward-looking statements\nWe caution readers.");
    }

    #[test]
    fn test_position_fallback_when_no_opening_found() {
        let mut lines = vec!["Table of Contents".to_string()];
        for n in 0..8 {
            lines.push(format!("Heading {}", n));
        }
        lines.push(PROSE.to_string());
        lines.push("Tail.".to_string());
        let text = lines.join("\n");

        let out = preprocess(&text);
        assert_eq!(out.stats.strategy, CleaningStrategy::PositionFallback);
        assert_eq!(out.text, format!("{}\nTail.", PROSE));
    }

    #[test]
    fn test_item_one_header_split_across_cells() {
        let text = format!(
            "Table of Contents\nItem 1.\nBusiness\n3\nItem 1A.\nRisk Factors\n21\n\
             PART I\nItem 1.\nBusiness\n{}\n{}",
            PROSE, PROSE
        );
        let out = preprocess(&text);
        assert_eq!(out.stats.strategy, CleaningStrategy::NarrativeStart);
        assert!(out.text.starts_with("Item 1.\nBusiness\nThe Company is a leading provider"));
        assert!(!out.text.contains("Risk Factors"));
    }

    #[test]
    fn test_late_contents_marker_keeps_everything() {
        let mut lines = vec!["ITEM 1 - BUSINESS".to_string()];
        for n in 0..1_200 {
            lines.push(format!("Operating results for period {} were in line with plan.", n));
        }
        lines.push("Table of Contents".to_string());
        lines.push("Item 7. Management's Discussion and Analysis".to_string());
        for _ in 0..50 {
            lines.push("Results of operations tail.".to_string());
        }
        let text = lines.join("\n");

        let out = preprocess(&text);
        assert_eq!(out.stats.strategy, CleaningStrategy::Untouched);
        assert_eq!(out.text, text);
        assert!(out.text.contains("Item 7. Management's Discussion"));
    }

    #[test]
    fn test_residual_keeps_text_past_scan_limit() {
        let mut lines = vec!["dei:DocumentType xbrl context id=c-1".to_string(), "10-K".to_string()];
        for n in 0..1_100 {
            lines.push(format!("Segment results for the business in period {} were reported.", n));
        }
        lines.push("Table of Contents".to_string());
        lines.push("Item 7. Management's Discussion and Analysis".to_string());
        lines.push("Results of operations tail.".to_string());
        let text = lines.join("\n");

        let out = preprocess(&text);
        assert_eq!(out.stats.strategy, CleaningStrategy::Residual);
        assert!(out.text.starts_with("Segment results for the business in period 0"));
        assert!(!out.text.contains("xbrl"));
        assert!(out.text.ends_with("Item 7. Management's Discussion and Analysis\nResults of operations tail."));
    }

    #[test]
    fn test_item_one_header_requires_substantial_followup() {
        let text = format!(
            "Table of Contents\nItem 1. Business\nItem 1A. Risk Factors\nItem 1. Business\n\n{}",
            PROSE
        );
        let out = preprocess(&text);
        assert_eq!(out.text, format!("Item 1. Business\n\n{}", PROSE));
    }
}
