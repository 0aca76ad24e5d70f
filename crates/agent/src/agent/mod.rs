//! Intake Agent
//!
//! Per-turn orchestration of the loan intake conversation. The agent owns
//! no session state: the caller passes the locked [`ConversationSession`]
//! into [`IntakeAgent::process_turn`], so one agent serves every session.
//!
//! The implementation is split into focused submodules:
//! - `processing`: `process_turn` and override validation
//! - `response`: reply rendering

mod processing;
mod response;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use loan_agent_catalog::{MatchStatus, MatchingEngine, ProductCatalog};
use loan_agent_config::constants::llm;
use loan_agent_config::{AgentConfig, FieldSchema};
use loan_agent_core::{ExtractionOracle, FieldMap, ProductMatch, ProductOracle, Stage, Turn};
use loan_agent_text_processing::{CustomerIntent, IntentDetector};

use crate::dst::reconciler::{ExtractionReconciler, OracleStatus};

/// Inbound customer message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    /// Client-held history, used only when the session has none
    #[serde(default)]
    pub history: Option<Vec<Turn>>,
    #[serde(default)]
    pub manual_field_overrides: Option<serde_json::Map<String, serde_json::Value>>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_override(mut self, field: &str, value: serde_json::Value) -> Self {
        self.manual_field_overrides
            .get_or_insert_with(Default::default)
            .insert(field.to_string(), value);
        self
    }
}

/// Override that failed validation and was discarded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedOverride {
    pub field: String,
    pub reason: String,
}

/// Result of one processed turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub stage: Stage,
    pub profile: FieldMap,
    pub recommendations: Vec<ProductMatch>,
    pub next_questions: Vec<String>,
    pub round_count: u32,
    pub rejected_overrides: Vec<RejectedOverride>,
    /// Set when matching ran this turn
    pub match_status: Option<MatchStatus>,
    pub oracle: OracleStatus,
    pub intent: CustomerIntent,
}

/// Loan intake agent
pub struct IntakeAgent {
    pub(crate) schema: Arc<FieldSchema>,
    pub(crate) config: AgentConfig,
    pub(crate) reconciler: ExtractionReconciler,
    pub(crate) intents: IntentDetector,
    pub(crate) matching: MatchingEngine,
    extraction_oracle: Option<Arc<dyn ExtractionOracle>>,
    pub(crate) product_oracle: Option<Arc<dyn ProductOracle>>,
    pub(crate) oracle_timeout: Duration,
}

impl IntakeAgent {
    /// Create a rules-only agent over `catalog`
    pub fn new(schema: Arc<FieldSchema>, config: AgentConfig, catalog: ProductCatalog) -> Self {
        let matching = MatchingEngine::new(catalog, config.near_miss_threshold);
        Self {
            reconciler: ExtractionReconciler::rules_only(schema.clone()),
            schema,
            config,
            intents: IntentDetector::new(),
            matching,
            extraction_oracle: None,
            product_oracle: None,
            oracle_timeout: Duration::from_secs(llm::TIMEOUT_SECS),
        }
    }

    /// Bound for every oracle call
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self.rebuild_reconciler();
        self
    }

    pub fn with_extraction_oracle(mut self, oracle: Arc<dyn ExtractionOracle>) -> Self {
        tracing::info!(oracle = oracle.name(), "Extraction oracle enabled");
        self.extraction_oracle = Some(oracle);
        self.rebuild_reconciler();
        self
    }

    pub fn with_product_oracle(mut self, oracle: Arc<dyn ProductOracle>) -> Self {
        tracing::info!(oracle = oracle.name(), "Product oracle enabled");
        self.product_oracle = Some(oracle);
        self
    }

    fn rebuild_reconciler(&mut self) {
        self.reconciler = ExtractionReconciler::new(
            self.extraction_oracle.clone(),
            self.schema.clone(),
            self.config.history_window,
            self.oracle_timeout,
        );
    }

    pub fn catalog(&self) -> &ProductCatalog {
        self.matching.catalog()
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}
