// src/extractors/visuals.rs
//! Tables and images belonging to a section, found by walking the tag tree forward
//! from the section's header.

use crate::config::ParserConfig;
use crate::extractors::section::prefix_chars;
use crate::filing::model::{ElementKind, VisualElement};
use crate::oracle::OracleGate;
use crate::outline::{self, ItemId};
use crate::utils::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

// --- CSS Selectors (Lazy Static) ---
static HEADER_CANDIDATE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h1, h2, h3, h4, h5, h6, div, span, p, b, strong, font")
        .expect("Failed to compile HEADER_CANDIDATE_SELECTOR")
});

// ToC containers (class/id containing 'toc')
static TOC_CONTAINER_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div[class*='toc'], nav[class*='toc'], div[id*='toc'], nav[id*='toc']")
        .expect("Failed to compile TOC_CONTAINER_SELECTOR")
});

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("Failed to compile LINK_SELECTOR"));

static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("Failed to compile ROW_SELECTOR"));

static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td, th").expect("Failed to compile CELL_SELECTOR"));

// "Item 7." alone, the typical ToC link text
static SIMPLE_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*Item\s+\d+[A-Z]?\.?\s*$").expect("Failed to compile SIMPLE_ITEM_RE"));

// Headings that open the next section
static NEXT_SECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:part\s+(?:iv|iii|ii|i)\b|item\s*(\d{1,2})([a-c])?\b|signatures\b)")
        .expect("Failed to compile NEXT_SECTION_RE")
});

const MAX_HEADER_CHARS: usize = 200;
const MIN_TABLE_ROWS: usize = 3;
const MIN_IMAGE_PX: u32 = 50;
const DESCRIBE_SAMPLE_CHARS: usize = 1_000;
const FALLBACK_DESCRIPTION_CHARS: usize = 100;
const STOP_ELEMENTS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "p", "div", "td", "b", "strong", "font", "span"];

const FINANCIAL_KEYWORDS: &[&str] = &[
    "million", "billion", "thousand", "$", "percent", "%", "revenue", "income", "loss", "assets",
    "liabilities", "ratio", "premium", "claim", "underwriting", "investment", "year ended",
    "december", "quarter", "fiscal",
];

const BOILERPLATE_MARKERS: &[&str] = &[
    "annual report pursuant",
    "securities exchange act",
    "check one",
    "commission file number",
];

/// A table or image selected for a section, before it is described.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualCandidate {
    pub kind: ElementKind,
    /// Pipe-delimited table rows, or the image's alt/title text.
    pub text: String,
}

fn element_text(element: ElementRef) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// Whitespace-collapsed text of `element`, or `None` once it reaches `limit` chars.
fn short_text(element: ElementRef, limit: usize) -> Option<String> {
    let mut out = String::new();
    for word in element.text().flat_map(str::split_whitespace) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        if out.len() >= limit * 4 {
            return None;
        }
    }
    (out.chars().count() < limit).then_some(out)
}

/// Whether an element is part of a table of contents rather than the body.
fn is_in_toc(element: ElementRef) -> bool {
    if element.value().name() == "a" && element.value().attr("href").is_some() {
        return true;
    }
    if TOC_CONTAINER_SELECTOR.matches(&element) {
        return true;
    }
    if element.select(&LINK_SELECTOR).next().is_some() {
        tracing::trace!("Header candidate wraps a hyperlink, likely ToC");
        return true;
    }

    let mut table_ancestor_found = false;
    for ancestor in element.ancestors().filter_map(ElementRef::wrap) {
        let name = ancestor.value().name();
        if TOC_CONTAINER_SELECTOR.matches(&ancestor) {
            return true;
        }
        if name == "a" && ancestor.value().attr("href").is_some() {
            return true;
        }
        if matches!(name, "td" | "tr" | "table") {
            table_ancestor_found = true;
        }
        if name == "body" {
            break;
        }
    }

    // Inside a table and reading just "Item N." is a ToC cell.
    table_ancestor_found && SIMPLE_ITEM_RE.is_match(&element_text(element))
}

fn item_header_regex(item: ItemId) -> Option<Regex> {
    let pattern = if item.is_signatures() {
        r"(?i)^\s*signatures?\s*$".to_string()
    } else {
        format!(r"(?i)\bitem\s*{}\b", regex::escape(&item.number().to_lowercase()))
    };
    Regex::new(&pattern).ok()
}

/// Finds the heading-like element opening the section, preferring an Item-number
/// match over a title match.
fn locate_header<'a>(document: &'a Html, item: ItemId, title: &str) -> Option<ElementRef<'a>> {
    let number_re = item_header_regex(item);
    let titles: Vec<String> = [title, item.title()]
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let candidates: Vec<(ElementRef<'a>, String)> = document
        .select(&HEADER_CANDIDATE_SELECTOR)
        .filter_map(|el| short_text(el, MAX_HEADER_CHARS).map(|text| (el, text)))
        .filter(|(_, text)| !text.is_empty())
        .collect();

    let by_number = candidates.iter().find(|(el, text)| {
        number_re.as_ref().map_or(false, |re| re.is_match(text)) && !is_in_toc(*el)
    });
    let found = by_number.or_else(|| {
        candidates.iter().find(|(el, text)| {
            let lower = text.to_lowercase();
            titles.iter().any(|t| lower.contains(t.as_str())) && !is_in_toc(*el)
        })
    });

    found.map(|(el, text)| {
        tracing::debug!("Visual anchor for {}: <{}> '{}'", item, el.value().name(), text);
        *el
    })
}

/// Next element in document order. With `descend`, children come first;
/// otherwise the element's subtree is skipped.
fn next_in_document(element: ElementRef, descend: bool) -> Option<ElementRef> {
    if descend {
        if let Some(child) = element.children().find_map(ElementRef::wrap) {
            return Some(child);
        }
    }
    let mut current = element;
    loop {
        if let Some(sibling) = current.next_siblings().find_map(ElementRef::wrap) {
            return Some(sibling);
        }
        current = current.parent().and_then(ElementRef::wrap)?;
    }
}

/// Whether `element` is a heading opening a section other than `current`.
fn opens_other_section(element: ElementRef, current: ItemId) -> bool {
    if !STOP_ELEMENTS.contains(&element.value().name()) {
        return false;
    }
    let Some(text) = short_text(element, MAX_HEADER_CHARS) else {
        return false;
    };
    let Some(caps) = NEXT_SECTION_RE.captures(&text) else {
        return false;
    };
    match caps.get(1) {
        Some(number) => {
            let letter = caps.get(2).map_or("", |m| m.as_str());
            let item = outline::normalize_item_id(&format!("item_{}{}", number.as_str(), letter));
            item.map_or(true, |i| i != current)
        }
        // Part heading or Signatures
        None => !(current.is_signatures() && text.to_lowercase().starts_with("signature")),
    }
}

/// Serialises a table to one "cell | cell" line per row.
pub fn table_to_text(table: ElementRef, max_rows: usize) -> Result<String, ExtractError> {
    let lines: Vec<String> = table
        .select(&ROW_SELECTOR)
        .take(max_rows)
        .filter_map(|row| {
            let cells: Vec<String> = row
                .select(&CELL_SELECTOR)
                .map(element_text)
                .filter(|cell| !cell.is_empty())
                .collect();
            (!cells.is_empty()).then(|| cells.join(" | "))
        })
        .collect();

    if lines.is_empty() {
        return Err(ExtractError::MalformedTable("no non-empty cells".into()));
    }
    Ok(lines.join("\n"))
}

/// Rejects layout tables, cover-page tables and tables without financial content.
pub fn is_meaningful_table(text: &str) -> bool {
    if text.chars().count() < 50 {
        return false;
    }
    if text.lines().filter(|l| !l.trim().is_empty()).count() < 3 {
        return false;
    }

    let lower = text.to_lowercase();
    if BOILERPLATE_MARKERS.iter().any(|m| lower.contains(m)) {
        return false;
    }
    if lower.contains("trading symbol") && lower.contains("new york stock exchange") {
        return false;
    }

    FINANCIAL_KEYWORDS.iter().filter(|k| lower.contains(*k)).count() >= 2
}

/// Whether a table concerns `item`: two hits from the item's table keywords.
/// Items without keywords accept any meaningful table.
pub fn is_section_relevant_table(text: &str, item: ItemId) -> bool {
    let keywords = item.table_keywords();
    if keywords.is_empty() {
        return true;
    }
    let lower = text.to_lowercase();
    keywords.iter().filter(|k| lower.contains(*k)).count() >= 2
}

fn pixel_attr(raw: Option<&str>) -> Result<Option<u32>, ExtractError> {
    match raw.map(|r| r.trim().trim_end_matches("px").trim()) {
        None | Some("") => Ok(None),
        Some(value) if value.ends_with('%') => Ok(None),
        Some(value) => value
            .parse::<f32>()
            .map(|px| Some(px as u32))
            .map_err(|_| ExtractError::MalformedImage(format!("unreadable size '{}'", value))),
    }
}

/// Alt/title text of an image large enough to be a chart.
fn image_text(img: ElementRef) -> Result<Option<String>, ExtractError> {
    let attrs = img.value();
    let text = attrs
        .attr("alt")
        .filter(|a| !a.trim().is_empty())
        .or_else(|| attrs.attr("title"))
        .map(|a| a.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|a| !a.is_empty());
    let Some(text) = text else {
        return Ok(None);
    };

    let width = pixel_attr(attrs.attr("width"))?;
    let height = pixel_attr(attrs.attr("height"))?;
    if width.map_or(false, |w| w < MIN_IMAGE_PX) || height.map_or(false, |h| h < MIN_IMAGE_PX) {
        return Ok(None);
    }
    Ok(Some(text))
}

/// Collects up to `max_visuals_per_section` tables and images for `item`.
///
/// Runs synchronously over the tag tree; a missing header yields no candidates.
pub fn collect_candidates(document: &Html, item: ItemId, title: &str, config: &ParserConfig) -> Vec<VisualCandidate> {
    let Some(header) = locate_header(document, item, title) else {
        tracing::debug!("No header element found for {}, no visuals", item);
        return Vec::new();
    };

    let mut candidates = Vec::new();
    let mut visited = 0usize;
    let mut cursor = next_in_document(header, false);

    while let Some(element) = cursor {
        if visited >= config.visual_traversal_budget || candidates.len() >= config.max_visuals_per_section {
            break;
        }
        visited += 1;

        if opens_other_section(element, item) {
            tracing::debug!("Visual scan for {} stopped at next section after {} elements", item, visited);
            break;
        }

        match element.value().name() {
            "table" => {
                if element.select(&ROW_SELECTOR).count() >= MIN_TABLE_ROWS {
                    match table_to_text(element, config.max_table_rows) {
                        Ok(text) if is_meaningful_table(&text) && is_section_relevant_table(&text, item) => {
                            candidates.push(VisualCandidate { kind: ElementKind::Table, text });
                        }
                        Ok(_) => tracing::debug!("Skipping non-financial or unrelated table in {}", item),
                        Err(e) => tracing::warn!("Skipping table in {}: {}", item, e),
                    }
                }
                cursor = next_in_document(element, false);
                continue;
            }
            "img" => match image_text(element) {
                Ok(Some(text)) => candidates.push(VisualCandidate { kind: ElementKind::Chart, text }),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping image in {}: {}", item, e),
            },
            _ => {}
        }

        cursor = next_in_document(element, true);
    }

    candidates
}

fn fallback_description(candidate: &VisualCandidate) -> String {
    format!(
        "{}: {}...",
        candidate.kind.label(),
        prefix_chars(&candidate.text, FALLBACK_DESCRIPTION_CHARS)
    )
}

/// Turns candidates into visual elements, describing each through the oracle when
/// one is available.
pub async fn describe_candidates(
    candidates: Vec<VisualCandidate>,
    item: ItemId,
    title: &str,
    gate: &OracleGate<'_>,
) -> Vec<VisualElement> {
    let mut tables = 0usize;
    let mut charts = 0usize;
    let mut elements = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let sample = prefix_chars(&candidate.text, DESCRIBE_SAMPLE_CHARS);
        let kind = candidate.kind;
        let description = gate
            .ask("describe_visual", |o| o.describe_visual(kind, sample))
            .await
            .unwrap_or_else(|| fallback_description(&candidate));

        let id = match kind {
            ElementKind::Table => {
                tables += 1;
                format!("{}_table_{}", item, tables - 1)
            }
            ElementKind::Chart => {
                charts += 1;
                format!("{}_chart_{}", item, charts - 1)
            }
        };

        elements.push(VisualElement {
            id,
            section_title: title.to_string(),
            kind,
            page_number: None,
            description,
            context: format!("Found in {}", title),
            extracted_text: Some(candidate.text),
        });
    }
    elements
}
