//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;
use std::time::Duration;

use loan_agent_agent::IntakeAgent;
use loan_agent_catalog::ProductCatalog;
use loan_agent_config::Settings;
use loan_agent_llm::{create_oracles, Oracles};

use crate::session::SessionManager;
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    /// One agent serves every session; per-session state lives in the registry
    pub agent: Arc<IntakeAgent>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(config: Settings, agent: IntakeAgent) -> Self {
        let sessions = SessionManager::new(&config.sessions);
        Self {
            config: Arc::new(config),
            agent: Arc::new(agent),
            sessions: Arc::new(sessions),
        }
    }

    /// Build the agent from settings: schema, catalog and oracles
    ///
    /// A missing API key or unusable LLM settings leave the agent running
    /// rules-only; only an unreadable field schema is fatal.
    pub fn from_settings(config: Settings) -> Result<Self, ServerError> {
        let schema = Arc::new(config.field_schema()?);
        let catalog = ProductCatalog::load(&config.catalog);
        tracing::info!(
            products = catalog.len(),
            lenders = ?catalog.lenders(),
            "Product catalog loaded"
        );

        let oracles = match create_oracles(&config.llm, schema.clone()) {
            Ok(oracles) => oracles,
            Err(e) => {
                tracing::warn!(error = %e, "LLM oracles unavailable, using rule-based extraction only");
                Oracles::none()
            },
        };

        let mut agent = IntakeAgent::new(schema, config.agent.clone(), catalog)
            .with_oracle_timeout(Duration::from_secs(config.llm.timeout_secs));
        if let Some(oracle) = oracles.extraction {
            agent = agent.with_extraction_oracle(oracle);
        }
        if let Some(oracle) = oracles.product {
            agent = agent.with_product_oracle(oracle);
        }

        Ok(Self::new(config, agent))
    }

    /// Ready once the catalog has at least one product
    pub fn is_ready(&self) -> bool {
        !self.agent.catalog().is_empty()
    }
}
