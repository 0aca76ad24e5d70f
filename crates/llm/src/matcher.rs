//! LLM-backed product oracle

use async_trait::async_trait;
use std::sync::Arc;

use loan_agent_core::{Error, FieldMap, Product, ProductOracle, ProductPick, Result};

use crate::backend::LlmBackend;
use crate::parse::extract_json_object;
use crate::prompt::PromptBuilder;

/// Product oracle that asks an LLM to choose among eligible candidates
///
/// The pick is returned as named by the model. Checking that it refers to
/// one of the candidates is the matching engine's job.
pub struct LlmProductOracle {
    backend: Arc<dyn LlmBackend>,
}

impl LlmProductOracle {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }
}

fn parse_pick(text: &str) -> Result<ProductPick> {
    let object = extract_json_object(text)
        .ok_or_else(|| Error::Oracle("product response contained no JSON object".into()))?;

    serde_json::from_value::<ProductPick>(serde_json::Value::Object(object))
        .map_err(|e| Error::Oracle(format!("malformed product pick: {}", e)))
}

#[async_trait]
impl ProductOracle for LlmProductOracle {
    async fn pick(&self, profile: &FieldMap, candidates: &[Product]) -> Result<ProductPick> {
        if candidates.is_empty() {
            return Err(Error::Oracle("no candidates to choose from".into()));
        }

        let messages = PromptBuilder::new()
            .product_system()
            .with_candidates(profile, candidates)
            .build();

        let result = self.backend.generate(&messages).await?;
        let pick = parse_pick(&result.text)?;
        tracing::debug!(product = %pick.product, lender = %pick.lender, "Product oracle picked");
        Ok(pick)
    }

    fn name(&self) -> &str {
        "llm_product"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GenerationResult;
    use crate::prompt::Message;
    use crate::LlmError;

    struct Reply(&'static str);

    #[async_trait]
    impl LlmBackend for Reply {
        async fn generate(
            &self,
            _messages: &[Message],
        ) -> std::result::Result<GenerationResult, LlmError> {
            Ok(GenerationResult::text(self.0))
        }

        fn model_name(&self) -> &str {
            "reply"
        }
    }

    fn candidates() -> Vec<Product> {
        vec![
            Product::new("Prime", "Acme", 6.89),
            Product::new("Everyday", "Bolt", 7.5),
        ]
    }

    #[tokio::test]
    async fn test_pick_parsed() {
        let oracle = LlmProductOracle::new(Arc::new(Reply(
            r#"I'd go with {"product": "Everyday", "lender": "Bolt", "reason": "No monthly fee"}"#,
        )));
        let pick = oracle.pick(&FieldMap::new(), &candidates()).await.unwrap();
        assert_eq!(pick.product, "Everyday");
        assert_eq!(pick.lender, "Bolt");
        assert_eq!(pick.reason.as_deref(), Some("No monthly fee"));
    }

    #[tokio::test]
    async fn test_missing_product_is_error() {
        let oracle = LlmProductOracle::new(Arc::new(Reply(r#"{"lender": "Bolt"}"#)));
        assert!(oracle.pick(&FieldMap::new(), &candidates()).await.is_err());
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let oracle = LlmProductOracle::new(Arc::new(Reply("{}")));
        assert!(oracle.pick(&FieldMap::new(), &[]).await.is_err());
    }
}
