// src/lib.rs
//! Structure parser for 10-K filings.
//!
//! A raw filing is flattened, cleaned of front matter and tagging noise, split into
//! chunks on section headers, and mapped onto the canonical Part/Item outline. Each
//! section carries its narrative text and the tables and charts found under its
//! header. Model-driven judgement calls go through an optional [`oracle::FilingOracle`];
//! every one of them has a deterministic fallback.

pub mod config;
pub mod edgar;
pub mod extractors;
pub mod filing;
pub mod oracle;
pub mod outline;
pub mod parser;
pub mod utils;

pub use config::{DuplicatePolicy, ParserConfig};
pub use filing::{FilingSection, ParsedFiling, VisualElement};
pub use parser::FilingParser;
