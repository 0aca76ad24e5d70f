//! Loan intake conversation agent
//!
//! Features:
//! - Customer profile store with ask/confirm tracking and a change log
//! - Extraction reconciliation (LLM oracle first, rule-based fallback)
//! - Stage state machine under a hard round budget
//! - Per-turn orchestration ending in product matching

pub mod agent;
pub mod conversation;
pub mod dst;
pub mod stage;

pub use agent::{IntakeAgent, RejectedOverride, TurnOutcome, TurnRequest};
pub use conversation::{ConversationSession, SessionSnapshot};
pub use dst::reconciler::{ExtractionCursor, ExtractionReconciler, OracleStatus, Reconciled};
pub use dst::{ChangeSource, CustomerProfile, StateChange};
pub use stage::{after_match, decide, StageDecision, StageInput, StageTransition, TransitionReason};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<loan_agent_config::ConfigError> for AgentError {
    fn from(err: loan_agent_config::ConfigError) -> Self {
        AgentError::Configuration(err.to_string())
    }
}

impl From<AgentError> for loan_agent_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::InvalidInput(message) => loan_agent_core::Error::InvalidField {
                field: "message".to_string(),
                message,
            },
            AgentError::Configuration(message) => loan_agent_core::Error::Config(message),
        }
    }
}
