// src/utils/error.rs
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum EdgarError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode), // e.g., 404 Not Found, 500

    #[error("SEC Rate limit likely exceeded")]
    RateLimited,

    #[error("Could not find CIK for {0}")]
    CompanyNotFound(String),

    #[error("No {form_type} filing found for CIK {cik}")]
    FilingNotFound { cik: String, form_type: String },

    #[error("Could not find specified filing: {0}")]
    FilingDocNotFound(String),

    #[error("Failed to parse EDGAR response: {0}")]
    Parse(String),
}

/// Failures of the structured-inference collaborator. Never fatal to a parse:
/// every call site replaces them with a deterministic fallback.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Model request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Model service returned HTTP {status}: {body}")]
    Http { status: reqwest::StatusCode, body: String },

    #[error("Model call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Oracle call budget exhausted")]
    BudgetExhausted,

    #[error("Malformed model response: {0}")]
    Malformed(String),

    #[error("Model output failed schema validation: {0}")]
    Schema(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Malformed table: {0}")]
    MalformedTable(String),

    #[error("Malformed image: {0}")]
    MalformedImage(String),
}

/// Errors surfaced to callers of the query interface.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid section path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("EDGAR interaction failed: {0}")]
    Edgar(#[from] EdgarError), // Automatically convert Edgar errors

    #[error("Oracle setup failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Query failed: {0}")]
    Query(#[from] QueryError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
