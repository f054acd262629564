// src/oracle/mod.rs
//! Seams for the model-driven judgement calls of the parser.
//!
//! The parser never talks to a model service directly. It asks a [`FilingOracle`]
//! four narrow questions, always through an [`OracleGate`] that enforces timeouts
//! and the call budget. Every call site owns a deterministic fallback, so a missing
//! oracle, a failed call and an exhausted budget all degrade the same way.

pub mod anthropic;
pub mod llm;

use crate::config::ParserConfig;
use crate::filing::model::ElementKind;
use crate::outline::ItemId;
use crate::utils::error::OracleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub use anthropic::AnthropicClient;
pub use llm::{LlmOracle, OutputSchema, StructuredInference};

/// A section the oracle claims to have found in a chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionClaim {
    /// Section identifier like 'item_7' or 'item_1a'.
    pub section_id: String,
    /// Part identifier like 'part_1' or 'part_2'.
    pub part: String,
    pub title: String,
    /// First few words where this section starts in the chunk.
    pub content_start: String,
    /// Estimated character count of this section.
    #[serde(default)]
    pub content_length: usize,
    /// Key terms or metrics found in this section.
    #[serde(default)]
    pub contains_key_info: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkAnalysis {
    pub sections_found: Vec<SectionClaim>,
    #[serde(default)]
    pub chunk_summary: String,
}

/// An addressable section offered to the path mapping oracle.
#[derive(Debug, Clone, Serialize)]
pub struct PathCandidate {
    pub path: String,
    pub section_id: String,
    pub title: String,
    pub description: String,
}

#[async_trait]
pub trait FilingOracle: Send + Sync {
    /// Identifies the outline sections present in a chunk of filing text.
    async fn locate_sections(&self, chunk: &str, chunk_index: usize) -> Result<ChunkAnalysis, OracleError>;

    /// Character offset in `window` where the section after `current` begins,
    /// or `None` when no boundary is visible.
    async fn locate_boundary(
        &self,
        window: &str,
        current: ItemId,
        upcoming: &[ItemId],
    ) -> Result<Option<usize>, OracleError>;

    /// Maps a loosely written path onto one of `candidates`, or `None` for no match.
    async fn resolve_path(&self, requested: &str, candidates: &[PathCandidate]) -> Result<Option<String>, OracleError>;

    /// One or two sentences describing a table or chart.
    async fn describe_visual(&self, kind: ElementKind, sample: &str) -> Result<String, OracleError>;
}

/// Budgeted access to an optional oracle for the duration of one operation.
pub struct OracleGate<'a> {
    oracle: Option<&'a dyn FilingOracle>,
    call_timeout: Duration,
    deadline: Option<Instant>,
    max_calls: Option<usize>,
    calls: AtomicUsize,
}

impl<'a> OracleGate<'a> {
    pub fn new(oracle: Option<&'a dyn FilingOracle>, config: &ParserConfig) -> Self {
        Self {
            oracle,
            call_timeout: config.oracle_call_timeout,
            deadline: config.parse_deadline.map(|d| Instant::now() + d),
            max_calls: config.max_oracle_calls,
            calls: AtomicUsize::new(0),
        }
    }

    /// A gate that never opens.
    pub fn disabled() -> Self {
        Self {
            oracle: None,
            call_timeout: Duration::ZERO,
            deadline: None,
            max_calls: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Whether a call made now would reach the oracle.
    pub fn is_available(&self) -> bool {
        self.oracle.is_some() && self.budget_error().is_none()
    }

    pub fn calls_made(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn budget_error(&self) -> Option<OracleError> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some(OracleError::Timeout(self.call_timeout));
            }
        }
        match self.max_calls {
            Some(max) if self.calls.load(Ordering::Relaxed) >= max => Some(OracleError::BudgetExhausted),
            _ => None,
        }
    }

    /// Reserves one call. `None` when there is no oracle or the budget is spent.
    pub fn acquire(&self, op: &str) -> Option<&'a dyn FilingOracle> {
        let oracle = self.oracle?;
        if let Some(err) = self.budget_error() {
            tracing::debug!("Oracle unavailable for {}: {}", op, err);
            return None;
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        Some(oracle)
    }

    /// Runs an oracle future under the per-call timeout, clipped to the deadline.
    pub async fn bounded<T, F>(&self, fut: F) -> Result<T, OracleError>
    where
        F: Future<Output = Result<T, OracleError>>,
    {
        let limit = match self.deadline {
            Some(deadline) => self
                .call_timeout
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.call_timeout,
        };
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| OracleError::Timeout(limit))?
    }

    /// Acquires, calls and bounds in one step. Failures are logged and become `None`.
    pub async fn ask<T, F, Fut>(&self, op: &str, call: F) -> Option<T>
    where
        F: FnOnce(&'a dyn FilingOracle) -> Fut,
        Fut: Future<Output = Result<T, OracleError>>,
    {
        let oracle = self.acquire(op)?;
        match self.bounded(call(oracle)).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Oracle {} failed, using fallback: {}", op, e);
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted oracle used by the unit tests of the parsing modules.
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct ScriptedOracle {
        pub analyses: Mutex<VecDeque<Result<ChunkAnalysis, String>>>,
        pub boundary: Option<usize>,
        pub path: Option<String>,
        pub description: Option<String>,
        pub delay: Option<Duration>,
    }

    #[async_trait]
    impl FilingOracle for ScriptedOracle {
        async fn locate_sections(&self, _chunk: &str, _chunk_index: usize) -> Result<ChunkAnalysis, OracleError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.analyses.lock().unwrap().pop_front();
            match next {
                Some(Ok(analysis)) => Ok(analysis),
                Some(Err(msg)) => Err(OracleError::Malformed(msg)),
                None => Err(OracleError::Malformed("script exhausted".into())),
            }
        }

        async fn locate_boundary(&self, _w: &str, _c: ItemId, _u: &[ItemId]) -> Result<Option<usize>, OracleError> {
            Ok(self.boundary)
        }

        async fn resolve_path(&self, _r: &str, _c: &[PathCandidate]) -> Result<Option<String>, OracleError> {
            Ok(self.path.clone())
        }

        async fn describe_visual(&self, _k: ElementKind, _s: &str) -> Result<String, OracleError> {
            self.description
                .clone()
                .ok_or_else(|| OracleError::Malformed("no description scripted".into()))
        }
    }

    pub fn claim(section_id: &str, part: &str, start: &str) -> SectionClaim {
        SectionClaim {
            section_id: section_id.into(),
            part: part.into(),
            title: String::new(),
            content_start: start.into(),
            content_length: 0,
            contains_key_info: vec![],
        }
    }
}
