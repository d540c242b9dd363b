//! Error types for the research orchestrator
//!
//! Only run-fatal conditions live here. Per-strategy search failures are
//! data (`ErrorRecord` in outcomes), and an unusable synthesis degrades the
//! report instead of erroring.

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, ResearchError>;

#[derive(Error, Debug)]
pub enum ResearchError {
    // =============================
    // Core Pipeline Errors
    // =============================

    /// Malformed or empty strategy output from the reasoning collaborator.
    /// Fatal: aborts the run before any search executes.
    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Workflow cancelled")]
    Cancelled,

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
