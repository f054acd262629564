// src/oracle/anthropic.rs
use super::llm::{OutputSchema, StructuredInference};
use crate::utils::error::OracleError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_RETRIES: usize = 3;
const INITIAL_BACKOFF_MS: u64 = 750;
const MAX_BACKOFF_MS: u64 = 5_000;

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { name: String, input: serde_json::Value },
    #[serde(other)]
    Other,
}

/// Messages API client. Stateless apart from its credentials, so one instance can
/// serve concurrent parses.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: usize,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, OracleError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            base_url: ANTHROPIC_API_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Posts a Messages request, retrying rate limits and server errors with backoff.
    async fn send(&self, body: serde_json::Value) -> Result<MessagesResponse, OracleError> {
        let url = format!("{}/v1/messages", self.base_url);
        let mut attempt = 0usize;
        let mut delay_ms = INITIAL_BACKOFF_MS;

        loop {
            attempt += 1;
            tracing::debug!("Sending model request (attempt {}) to {}", attempt, url);
            let response = self
                .http
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response.json::<MessagesResponse>().await?);
            }

            let text = response.text().await.unwrap_or_default();
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if !retryable || attempt >= self.max_retries {
                tracing::warn!("Model service returned {} after {} attempt(s)", status, attempt);
                return Err(OracleError::Http { status, body: text });
            }

            tracing::warn!("Model service returned {} on attempt {}, retrying in {}ms", status, attempt, delay_ms);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            delay_ms = (delay_ms * 7 / 4).min(MAX_BACKOFF_MS);
        }
    }
}

#[async_trait]
impl StructuredInference for AnthropicClient {
    async fn submit_text(&self, prompt: &str, max_tokens: u32) -> Result<String, OracleError> {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });
        let response = self.send(body).await?;
        response
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                _ => None,
            })
            .ok_or_else(|| OracleError::Malformed("response has no text block".into()))
    }

    async fn submit_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
        max_tokens: u32,
    ) -> Result<serde_json::Value, OracleError> {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "tools": [{
                "name": schema.name,
                "description": schema.description,
                "input_schema": schema.schema,
            }],
            "tool_choice": {"type": "tool", "name": schema.name},
            "messages": [{"role": "user", "content": prompt}],
        });
        let response = self.send(body).await?;
        response
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::ToolUse { name, input } if name == schema.name => Some(input),
                _ => None,
            })
            .ok_or_else(|| OracleError::Malformed(format!("response has no '{}' tool call", schema.name)))
    }
}
