// src/oracle/llm.rs
use super::{ChunkAnalysis, FilingOracle, PathCandidate};
use crate::filing::model::ElementKind;
use crate::outline::{self, ItemId};
use crate::utils::error::OracleError;
use async_trait::async_trait;
use serde_json::json;

const NOT_FOUND: &str = "NOT_FOUND";

/// Tool definition constraining a structured model answer.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: serde_json::Value,
}

/// Transport to a model service able to answer free-text and schema-constrained prompts.
#[async_trait]
pub trait StructuredInference: Send + Sync {
    async fn submit_text(&self, prompt: &str, max_tokens: u32) -> Result<String, OracleError>;

    async fn submit_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
        max_tokens: u32,
    ) -> Result<serde_json::Value, OracleError>;
}

fn chunk_analysis_schema() -> OutputSchema {
    OutputSchema {
        name: "analyze_chunk",
        description: "Analyze a 10-K filing chunk and identify sections",
        schema: json!({
            "type": "object",
            "properties": {
                "sections_found": {
                    "type": "array",
                    "description": "List of sections identified in this chunk",
                    "items": {
                        "type": "object",
                        "properties": {
                            "section_id": {"type": "string", "description": "Section identifier like 'item_7' or 'item_1a'"},
                            "part": {"type": "string", "description": "Part identifier like 'part_1' or 'part_2'"},
                            "title": {"type": "string", "description": "Full section title"},
                            "content_start": {"type": "string", "description": "First few words where this section starts in the chunk"},
                            "content_length": {"type": "integer", "description": "Estimated character count of this section"},
                            "contains_key_info": {"type": "array", "items": {"type": "string"}, "description": "Key terms or metrics found in this section"}
                        },
                        "required": ["section_id", "part", "title", "content_start", "content_length"]
                    }
                },
                "chunk_summary": {"type": "string", "description": "Brief description of what this chunk contains"}
            },
            "required": ["sections_found", "chunk_summary"]
        }),
    }
}

/// Answers the parser's questions by prompting a model through `I`.
pub struct LlmOracle<I> {
    inference: I,
}

impl<I: StructuredInference> LlmOracle<I> {
    pub fn new(inference: I) -> Self {
        Self { inference }
    }

    fn mapping_prompt(chunk: &str, chunk_index: usize) -> String {
        format!(
            "Analyze this SEC 10-K filing chunk and identify which sections it contains.\n\n\
             10-K sections appear SEQUENTIALLY:\n{}\n\n\
             For each section found, provide:\n\
             - section_id: like \"item_7\" or \"item_1a\" (use \"signatures\" for the signatures page)\n\
             - part: like \"part_1\" or \"part_2\"\n\
             - title: full section title\n\
             - content_start: first few words where the section begins, copied exactly\n\
             - content_length: estimated character count\n\
             - contains_key_info: key terms or metrics found (e.g. combined ratio, underwriting, revenue)\n\n\
             CHUNK {}:\n{}",
            outline::outline_summary(),
            chunk_index + 1,
            chunk
        )
    }

    fn boundary_prompt(window: &str, current: ItemId, upcoming: &[ItemId]) -> String {
        let next: Vec<String> = upcoming
            .iter()
            .map(|i| format!("{} ({})", i.label(), i.title()))
            .collect();
        format!(
            "Find where section {current} ends and the next section begins.\n\n\
             Current section: {current} ({title})\n\
             Look for these next sections: {next}\n\n\
             The content may contain leftover HTML, so headers can appear inside tags.\n\n\
             Content:\n{window}\n\n\
             Return ONLY the character position where the next section header begins, \
             or \"{NOT_FOUND}\" if no clear boundary is found. Just return a number like \"1205\" or \"{NOT_FOUND}\".",
            current = current.label(),
            title = current.title(),
            next = next.join(", "),
            window = window,
        )
    }

    fn path_prompt(requested: &str, candidates: &[PathCandidate]) -> String {
        let listing: Vec<String> = candidates
            .iter()
            .map(|c| format!("- {}: {} ({})", c.path, c.title, c.description))
            .collect();
        format!(
            "Map the user's section path to the correct internal path.\n\n\
             User requested path: \"{requested}\"\n\n\
             Available sections:\n{}\n\n\
             Common mappings:\n\
             - Part1 or PartI -> part_1\n\
             - Part2 or PartII -> part_2\n\
             - Item1A -> item_1a\n\
             - Item7 -> item_7\n\n\
             Return just the exact internal path that matches the user's request, or \"{NOT_FOUND}\" if no match.",
            listing.join("\n"),
        )
    }

    fn describe_prompt(kind: ElementKind, sample: &str) -> String {
        match kind {
            ElementKind::Table => format!(
                "Summarize this financial table in 1-2 sentences:\n\n{}\n\n\
                 Focus on what financial data is shown and key metrics. Be concise.",
                sample
            ),
            ElementKind::Chart => format!(
                "Describe this image/chart in 1-2 sentences based on context:\n\n\
                 Alt text/title: {}\n\n\
                 Focus on what financial information it likely shows. Be concise.",
                sample
            ),
        }
    }
}

/// Reads a bare answer, treating NOT_FOUND (in any quoting) as no answer.
fn bare_answer(raw: &str) -> Option<String> {
    let answer = raw.trim().trim_matches(|c| c == '"' || c == '`' || c == '\'').trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case(NOT_FOUND) {
        None
    } else {
        Some(answer.to_string())
    }
}

fn parse_position(raw: &str) -> Result<Option<usize>, OracleError> {
    match bare_answer(raw) {
        None => Ok(None),
        Some(answer) => answer
            .parse::<usize>()
            .map(Some)
            .map_err(|_| OracleError::Malformed(format!("expected a character position, got '{}'", answer))),
    }
}

#[async_trait]
impl<I: StructuredInference> FilingOracle for LlmOracle<I> {
    async fn locate_sections(&self, chunk: &str, chunk_index: usize) -> Result<ChunkAnalysis, OracleError> {
        let prompt = Self::mapping_prompt(chunk, chunk_index);
        let value = self
            .inference
            .submit_structured(&prompt, &chunk_analysis_schema(), 1500)
            .await?;
        let analysis: ChunkAnalysis = serde_json::from_value(value)?;
        Ok(analysis)
    }

    async fn locate_boundary(
        &self,
        window: &str,
        current: ItemId,
        upcoming: &[ItemId],
    ) -> Result<Option<usize>, OracleError> {
        let prompt = Self::boundary_prompt(window, current, upcoming);
        let answer = self.inference.submit_text(&prompt, 50).await?;
        parse_position(&answer)
    }

    async fn resolve_path(&self, requested: &str, candidates: &[PathCandidate]) -> Result<Option<String>, OracleError> {
        let prompt = Self::path_prompt(requested, candidates);
        let answer = self.inference.submit_text(&prompt, 100).await?;
        Ok(bare_answer(&answer))
    }

    async fn describe_visual(&self, kind: ElementKind, sample: &str) -> Result<String, OracleError> {
        let prompt = Self::describe_prompt(kind, sample);
        let answer = self.inference.submit_text(&prompt, 100).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(OracleError::Malformed("empty description".into()));
        }
        Ok(answer.to_string())
    }
}
