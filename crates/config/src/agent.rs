//! Agent configuration
//!
//! Conversation policy (round budget, ask limits, windows) and the LLM
//! settings used by the extraction and product-matching oracles.

use serde::{Deserialize, Serialize};

use crate::constants::{conversation, endpoints, llm, matching};

/// Conversation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Customer rounds before matching is forced
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Times a required field is asked before it stops blocking
    #[serde(default = "default_max_ask_attempts")]
    pub max_ask_attempts: u32,

    /// Minimum questions per collecting turn
    #[serde(default = "default_questions_per_turn")]
    pub questions_per_turn: usize,

    /// Rounds spent asking for preferences
    #[serde(default = "default_max_preference_rounds")]
    pub max_preference_rounds: u32,

    /// Trailing turns sent to the extraction oracle
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Maximum unmet requirements for a near-miss recommendation
    #[serde(default = "default_near_miss_threshold")]
    pub near_miss_threshold: usize,

    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,

    #[serde(default = "default_max_recent_questions")]
    pub max_recent_questions: usize,
}

fn default_max_rounds() -> u32 {
    conversation::MAX_ROUNDS
}
fn default_max_ask_attempts() -> u32 {
    conversation::MAX_ASK_ATTEMPTS
}
fn default_questions_per_turn() -> usize {
    conversation::QUESTIONS_PER_TURN
}
fn default_max_preference_rounds() -> u32 {
    conversation::MAX_PREFERENCE_ROUNDS
}
fn default_history_window() -> usize {
    conversation::HISTORY_WINDOW
}
fn default_near_miss_threshold() -> usize {
    matching::NEAR_MISS_THRESHOLD
}
fn default_max_recommendations() -> usize {
    conversation::MAX_RECOMMENDATIONS
}
fn default_max_recent_questions() -> usize {
    conversation::MAX_RECENT_QUESTIONS
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_ask_attempts: default_max_ask_attempts(),
            questions_per_turn: default_questions_per_turn(),
            max_preference_rounds: default_max_preference_rounds(),
            history_window: default_history_window(),
            near_miss_threshold: default_near_miss_threshold(),
            max_recommendations: default_max_recommendations(),
            max_recent_questions: default_max_recent_questions(),
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider
    #[serde(default = "default_llm_provider")]
    pub provider: LlmProvider,

    /// Model name/ID
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API base endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key; falls back to ANTHROPIC_API_KEY when unset
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-call timeout for oracle requests
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Ask the LLM to pick among fully eligible products
    #[serde(default)]
    pub product_matching: bool,
}

fn default_llm_provider() -> LlmProvider {
    LlmProvider::Claude
}
fn default_llm_model() -> String {
    llm::DEFAULT_MODEL.to_string()
}
fn default_llm_endpoint() -> String {
    endpoints::ANTHROPIC_DEFAULT.to_string()
}
fn default_timeout_secs() -> u64 {
    llm::TIMEOUT_SECS
}
fn default_max_tokens() -> usize {
    llm::MAX_TOKENS
}
fn default_temperature() -> f32 {
    0.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            product_matching: false,
        }
    }
}

impl LlmConfig {
    /// Configured key, or ANTHROPIC_API_KEY from the environment
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

/// LLM provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Anthropic Claude
    Claude,
    /// No oracle; rule-based extraction only
    Disabled,
}
