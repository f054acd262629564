// src/filing/mod.rs
pub mod model;
pub mod query;

pub use model::{ElementKind, FilingSection, ParsedFiling, PartNode, VisualElement};
