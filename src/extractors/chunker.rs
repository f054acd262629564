// src/extractors/chunker.rs
use once_cell::sync::Lazy;
use regex::Regex;

// Lines that may open a new chunk: Part I-IV, Item 1-16 (with letter), Signatures
static SECTION_BREAK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:part\s+(?:iv|iii|ii|i)\b|item\s*(?:1[0-6]|[1-9])[a-c]?\b|signatures\b)")
        .expect("valid section break regex")
});

pub fn is_section_break(line: &str) -> bool {
    SECTION_BREAK_RE.is_match(line)
}

/// Splits text into chunks of roughly `max_chunk_size` characters.
///
/// A chunk is only closed when the next line opens a section, so a section never
/// straddles two chunks merely because of size. Without break lines the text stays
/// one chunk, however long.
pub fn split_into_chunks(text: &str, max_chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for line in text.lines() {
        let line_chars = line.chars().count();
        let would_overflow = current_chars + line_chars > max_chunk_size;
        if would_overflow && is_section_break(line) && !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
            current.clear();
            current_chars = 0;
        }
        current.push_str(line);
        current.push('\n');
        current_chars += line_chars + 1;
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    tracing::info!("Split {} chars into {} chunk(s)", text.chars().count(), chunks.len());
    chunks
}
