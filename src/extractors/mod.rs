// src/extractors/mod.rs
pub mod chunker;
pub mod preprocess;
pub mod section;
pub mod structure;
pub mod visuals;

// Re-export key extraction types for convenience
pub use preprocess::{CleaningStrategy, Preprocessed, PreprocessStats};
pub use structure::ValidClaim;
pub use visuals::VisualCandidate;
