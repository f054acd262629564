// src/parser.rs
use crate::config::ParserConfig;
use crate::extractors::chunker::split_into_chunks;
use crate::extractors::preprocess::{flatten_text, preprocess};
use crate::extractors::section::extract_section_content;
use crate::extractors::structure::map_chunk;
use crate::extractors::visuals::{collect_candidates, describe_candidates, VisualCandidate};
use crate::filing::model::{FilingSection, ParsedFiling, SectionTree};
use crate::filing::query;
use crate::oracle::{FilingOracle, OracleGate};
use crate::utils::error::QueryError;
use scraper::Html;
use std::sync::Arc;

/// Reconstructs the section structure of 10-K filings.
///
/// Works without an oracle; with one, section mapping, boundary detection, path
/// mapping and visual descriptions are delegated to it, each with a deterministic
/// fallback.
pub struct FilingParser {
    config: ParserConfig,
    oracle: Option<Arc<dyn FilingOracle>>,
}

impl FilingParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config, oracle: None }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn FilingOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    fn gate(&self) -> OracleGate<'_> {
        OracleGate::new(self.oracle.as_deref(), &self.config)
    }

    /// Parses a raw filing into its Part/Item structure.
    ///
    /// Never fails: oracle problems degrade to fallbacks and a filing without any
    /// recognisable section yields an empty structure.
    pub async fn parse_filing(&self, raw_document: &str, source_url: &str) -> ParsedFiling {
        // The tag tree is not Send, so it never lives across an await.
        let text = {
            let document = Html::parse_document(raw_document);
            flatten_text(&document)
        };
        let total_length = text.chars().count();

        let cleaned = preprocess(&text);
        let chunks = split_into_chunks(&cleaned.text, self.config.max_chunk_size);
        tracing::info!(
            "Parsing {} ({} chunks, oracle {})",
            source_url,
            chunks.len(),
            if self.has_oracle() { "enabled" } else { "disabled" }
        );

        let gate = self.gate();
        let mut skipped_chunks = 0usize;
        let mut claimed = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let use_oracle = index < self.config.max_oracle_chunks;
            let Some(claims) = map_chunk(chunk, index, &gate, use_oracle, &self.config).await else {
                skipped_chunks += 1;
                continue;
            };
            for claim in claims {
                let narrative = extract_section_content(chunk, &claim, &gate, &self.config).await;
                claimed.push((index, claim, narrative));
            }
        }

        let candidates: Vec<Vec<VisualCandidate>> = {
            let document = Html::parse_document(raw_document);
            claimed
                .iter()
                .map(|(_, claim, _)| collect_candidates(&document, claim.item, &claim.title, &self.config))
                .collect()
        };

        let mut tree = SectionTree::new(self.config.duplicate_policy);
        for ((index, claim, narrative), candidates) in claimed.into_iter().zip(candidates) {
            let visuals = describe_candidates(candidates, claim.item, &claim.title, &gate).await;
            tracing::debug!(
                "{}: {} chars, {} visual(s) from chunk {}",
                claim.item,
                narrative.chars().count(),
                visuals.len(),
                index + 1
            );
            let section = FilingSection::new(claim.item, claim.title, narrative, visuals, claim.key_terms);
            tree.insert(section);
        }

        let parsed = tree.finish(source_url, total_length, cleaned.stats.cleaned_len, chunks.len());
        tracing::info!(
            "Stored {} section(s) across {} part(s); {} chunk(s) skipped, {} oracle call(s)",
            parsed.section_count(),
            parsed.parts.len(),
            skipped_chunks,
            gate.calls_made()
        );
        parsed
    }

    /// See [`query::get_section_by_path`].
    pub async fn get_section_by_path<'p>(
        &self,
        parsed: &'p ParsedFiling,
        path: &str,
    ) -> Result<Option<&'p FilingSection>, QueryError> {
        let gate = self.gate();
        query::get_section_by_path(parsed, path, &gate, self.config.max_path_candidates).await
    }

    /// See [`query::find_sections_by_keywords`].
    pub fn find_sections_by_keywords<'p, S: AsRef<str>>(
        &self,
        parsed: &'p ParsedFiling,
        keywords: &[S],
    ) -> Vec<(String, &'p FilingSection)> {
        query::find_sections_by_keywords(parsed, keywords)
    }
}

impl Default for FilingParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicatePolicy;
    use crate::outline;

    // Item 7 appears twice; the header scan maps each occurrence in its own chunk.
    fn repeated_mdna() -> String {
        format!(
            "<html><body>\
             <p>Item 7. Management's Discussion</p><p>{}</p>\
             <p>Item 7. Management's Discussion (continued)</p><p>{}</p>\
             </body></html>",
            "Premiums grew across every segment. ".repeat(9),
            "Continued discussion of reserves. ".repeat(5),
        )
    }

    fn parse_with(policy: DuplicatePolicy) -> ParsedFiling {
        let parser = FilingParser::new(ParserConfig {
            max_chunk_size: 200,
            duplicate_policy: policy,
            ..ParserConfig::default()
        });
        tokio_test::block_on(parser.parse_filing(&repeated_mdna(), "memory://filing"))
    }

    #[test]
    fn test_default_parser_is_deterministic() {
        let parser = FilingParser::default();
        assert!(!parser.has_oracle());
        assert_eq!(parser.config().max_oracle_chunks, 6);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_parse_future_is_send() {
        let parser = FilingParser::default();
        let raw = repeated_mdna();
        let future = parser.parse_filing(&raw, "memory://filing");
        assert_send(&future);
        let parsed = tokio_test::block_on(future);
        assert_eq!(parsed.section_count(), 1);
    }

    #[test]
    fn test_duplicate_policies() {
        let item_7 = outline::item("item_7").unwrap();

        let parsed = parse_with(DuplicatePolicy::PreferLonger);
        assert_eq!(parsed.chunks_processed, 2);
        assert_eq!(parsed.section_count(), 1);
        assert!(parsed.find(item_7).unwrap().content.contains("Premiums grew"));

        let parsed = parse_with(DuplicatePolicy::LastWins);
        let content = &parsed.find(item_7).unwrap().content;
        assert!(content.contains("Continued discussion"));
        assert!(!content.contains("Premiums grew"));
    }
}
