// src/config.rs
use std::time::Duration;

/// How to reconcile two chunks claiming the same section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Keep whichever claim produced more content; ties go to the later chunk.
    #[default]
    PreferLonger,
    /// The later chunk always replaces the earlier one.
    LastWins,
}

/// Tuning knobs for the filing structure parser.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Soft chunk size in characters. Chunks only break on section headers.
    pub max_chunk_size: usize,
    /// Chunks sent to the section mapping oracle. Later chunks are header-scanned.
    pub max_oracle_chunks: usize,
    /// Prefix of each chunk shown to the mapping oracle.
    pub oracle_chunk_chars: usize,
    /// Window taken from a section's start before its end is located.
    pub section_window: usize,
    /// Prefix of the window shown to the boundary oracle.
    pub boundary_prompt_chars: usize,
    /// Windows shorter than this skip the boundary oracle.
    pub oracle_boundary_min_window: usize,
    /// Oracle boundaries yielding less content than this are rejected.
    pub min_oracle_boundary_content: usize,
    pub min_regex_boundary_content: usize,
    /// Slice taken when the regex boundary leaves a degenerate section.
    pub short_section_fallback: usize,
    /// Chunk prefix returned when the section cannot be located at all.
    pub last_resort_len: usize,
    pub max_visuals_per_section: usize,
    /// Elements visited forward from a section header while collecting visuals.
    pub visual_traversal_budget: usize,
    pub max_table_rows: usize,
    /// Available paths listed to the path mapping oracle.
    pub max_path_candidates: usize,
    pub oracle_call_timeout: Duration,
    /// Overall deadline for the oracle calls of one parse.
    pub parse_deadline: Option<Duration>,
    pub max_oracle_calls: Option<usize>,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 50_000,
            max_oracle_chunks: 6,
            oracle_chunk_chars: 8_000,
            section_window: 50_000,
            boundary_prompt_chars: 8_000,
            oracle_boundary_min_window: 1_000,
            min_oracle_boundary_content: 500,
            min_regex_boundary_content: 100,
            short_section_fallback: 5_000,
            last_resort_len: 10_000,
            max_visuals_per_section: 3,
            visual_traversal_budget: 2_000,
            max_table_rows: 20,
            max_path_candidates: 20,
            oracle_call_timeout: Duration::from_secs(60),
            parse_deadline: Some(Duration::from_secs(600)),
            max_oracle_calls: None,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}
