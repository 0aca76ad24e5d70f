//! LLM Factory
//!
//! Builds the configured backend and wraps it in the oracles the agent
//! uses. A disabled provider, or Claude without an API key, yields no
//! oracles and the agent runs on rule-based extraction alone.

use std::sync::Arc;
use std::time::Duration;

use loan_agent_config::{FieldSchema, LlmConfig, LlmProvider};
use loan_agent_core::{ExtractionOracle, ProductOracle};

use crate::backend::LlmBackend;
use crate::claude::{ClaudeBackend, ClaudeConfig};
use crate::extraction::LlmExtractionOracle;
use crate::matcher::LlmProductOracle;
use crate::LlmError;

/// Oracles built from configuration
#[derive(Clone, Default)]
pub struct Oracles {
    pub extraction: Option<Arc<dyn ExtractionOracle>>,
    pub product: Option<Arc<dyn ProductOracle>>,
}

impl Oracles {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Create a backend for the configured provider
///
/// Returns `Ok(None)` for [`LlmProvider::Disabled`].
pub fn create_backend(config: &LlmConfig) -> Result<Option<Arc<dyn LlmBackend>>, LlmError> {
    match config.provider {
        LlmProvider::Disabled => Ok(None),
        LlmProvider::Claude => {
            let api_key = config.resolved_api_key().ok_or_else(|| {
                LlmError::Configuration("Claude provider requires an API key".to_string())
            })?;

            let claude = ClaudeConfig::new(api_key)
                .with_model(config.model.clone())
                .with_max_tokens(config.max_tokens)
                .with_temperature(config.temperature)
                .with_timeout(Duration::from_secs(config.timeout_secs))
                .with_endpoint(config.endpoint.clone());

            Ok(Some(Arc::new(ClaudeBackend::new(claude)?)))
        },
    }
}

/// Create the extraction oracle and, when enabled, the product oracle
pub fn create_oracles(config: &LlmConfig, schema: Arc<FieldSchema>) -> Result<Oracles, LlmError> {
    let Some(backend) = create_backend(config)? else {
        tracing::info!("LLM provider disabled, using rule-based extraction only");
        return Ok(Oracles::none());
    };

    tracing::info!(
        model = backend.model_name(),
        product_matching = config.product_matching,
        "LLM oracles ready"
    );

    let extraction: Arc<dyn ExtractionOracle> =
        Arc::new(LlmExtractionOracle::new(backend.clone(), schema));
    let product = config
        .product_matching
        .then(|| Arc::new(LlmProductOracle::new(backend)) as Arc<dyn ProductOracle>);

    Ok(Oracles {
        extraction: Some(extraction),
        product,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_provider() {
        let config = LlmConfig {
            provider: LlmProvider::Disabled,
            ..Default::default()
        };
        assert!(create_backend(&config).unwrap().is_none());

        let oracles = create_oracles(&config, Arc::new(FieldSchema::loan_intake())).unwrap();
        assert!(oracles.extraction.is_none());
        assert!(oracles.product.is_none());
    }

    #[test]
    fn test_claude_with_key() {
        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            product_matching: true,
            ..Default::default()
        };
        let backend = create_backend(&config).unwrap().unwrap();
        assert_eq!(backend.model_name(), config.model);

        let oracles = create_oracles(&config, Arc::new(FieldSchema::loan_intake())).unwrap();
        assert_eq!(oracles.extraction.unwrap().name(), "llm_extraction");
        assert_eq!(oracles.product.unwrap().name(), "llm_product");
    }

    #[test]
    fn test_product_matching_off_by_default() {
        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let oracles = create_oracles(&config, Arc::new(FieldSchema::loan_intake())).unwrap();
        assert!(oracles.extraction.is_some());
        assert!(oracles.product.is_none());
    }
}
