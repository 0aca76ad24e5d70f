//! LLM integration for the loan intake agent
//!
//! Features:
//! - Pluggable backend trait with a Claude (Anthropic Messages API) implementation
//! - Extraction oracle that turns a conversation window into typed fields
//! - Product oracle that picks one product among eligible candidates
//! - Tolerant JSON recovery from free-form model output

pub mod backend;
pub mod claude;
pub mod extraction;
pub mod factory;
pub mod matcher;
pub mod parse;
pub mod prompt;

pub use backend::{FinishReason, GenerationResult, LlmBackend};
pub use claude::{ClaudeBackend, ClaudeConfig};
pub use extraction::LlmExtractionOracle;
pub use factory::{create_backend, create_oracles, Oracles};
pub use matcher::LlmProductOracle;
pub use parse::extract_json_object;
pub use prompt::{Message, PromptBuilder, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for loan_agent_core::Error {
    fn from(err: LlmError) -> Self {
        loan_agent_core::Error::Oracle(err.to_string())
    }
}
