// src/edgar/mod.rs
pub mod client;
pub mod models;

use crate::utils::error::EdgarError;
use async_trait::async_trait;

pub use client::EdgarClient;
pub use models::FilingInfo;

/// Where raw filings come from. Failures here are fatal to a parse attempt.
#[async_trait]
pub trait FilingSource: Send + Sync {
    /// Most recent filing of `form_type` for a ticker or CIK.
    async fn resolve_latest_filing(&self, company: &str, form_type: &str) -> Result<FilingInfo, EdgarError>;

    async fn fetch_raw_document(&self, url: &str) -> Result<String, EdgarError>;
}
