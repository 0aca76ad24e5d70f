//! LLM-backed extraction oracle

use async_trait::async_trait;
use std::sync::Arc;

use loan_agent_config::{CoerceMode, FieldSchema};
use loan_agent_core::{Error, ExtractionOracle, FieldMap, Result, Turn};

use crate::backend::LlmBackend;
use crate::parse::extract_json_object;
use crate::prompt::PromptBuilder;

/// Extraction oracle that asks an LLM for a JSON object of field values
///
/// Every returned value goes through the schema with [`CoerceMode::Clamp`].
/// Nulls, unknown keys and values that fail coercion are dropped
/// individually; only a response with no JSON object at all is an error.
pub struct LlmExtractionOracle {
    backend: Arc<dyn LlmBackend>,
    schema: Arc<FieldSchema>,
}

impl LlmExtractionOracle {
    pub fn new(backend: Arc<dyn LlmBackend>, schema: Arc<FieldSchema>) -> Self {
        Self { backend, schema }
    }

    fn coerce_response(&self, text: &str) -> Result<FieldMap> {
        let object = extract_json_object(text)
            .ok_or_else(|| Error::Oracle("extraction response contained no JSON object".into()))?;

        let mut fields = FieldMap::new();
        for (name, raw) in object {
            if raw.is_null() {
                continue;
            }
            match self.schema.coerce(&name, &raw, CoerceMode::Clamp) {
                Ok(value) => {
                    fields.insert(name, value);
                },
                Err(e) => {
                    tracing::debug!(field = %name, error = %e, "Dropping extracted value");
                },
            }
        }
        Ok(fields)
    }
}

#[async_trait]
impl ExtractionOracle for LlmExtractionOracle {
    async fn extract(&self, window: &[Turn]) -> Result<FieldMap> {
        if window.is_empty() {
            return Ok(FieldMap::new());
        }

        let messages = PromptBuilder::new()
            .extraction_system(&self.schema)
            .with_transcript(window)
            .build();

        let result = self.backend.generate(&messages).await?;
        tracing::debug!(
            model = self.backend.model_name(),
            tokens = result.tokens,
            total_time_ms = result.total_time_ms,
            "Extraction oracle responded"
        );

        self.coerce_response(&result.text)
    }

    fn name(&self) -> &str {
        "llm_extraction"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GenerationResult;
    use crate::prompt::Message;
    use crate::LlmError;
    use loan_agent_core::FieldValue;
    use std::sync::Mutex;

    struct CannedBackend {
        reply: std::result::Result<String, String>,
        seen: Mutex<Vec<Message>>,
    }

    impl CannedBackend {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmBackend for CannedBackend {
        async fn generate(
            &self,
            messages: &[Message],
        ) -> std::result::Result<GenerationResult, LlmError> {
            self.seen.lock().unwrap().extend(messages.iter().cloned());
            match &self.reply {
                Ok(text) => Ok(GenerationResult::text(text.clone())),
                Err(e) => Err(LlmError::Api(e.clone())),
            }
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn build(backend: CannedBackend) -> (LlmExtractionOracle, Arc<CannedBackend>) {
        let backend = Arc::new(backend);
        let oracle =
            LlmExtractionOracle::new(backend.clone(), Arc::new(FieldSchema::loan_intake()));
        (oracle, backend)
    }

    #[tokio::test]
    async fn test_coerces_and_drops_invalid() {
        let (oracle, _) = build(CannedBackend::ok(
            r#"```json
{"credit_score": 950, "ABN_years": "3", "loan_type": "Commercial",
 "property_owner": null, "asset_type": "spaceship", "favourite_colour": "blue"}
```"#,
        ));

        let fields = oracle.extract(&[Turn::user("hi")]).await.unwrap();
        assert_eq!(fields.get("credit_score"), Some(&FieldValue::Number(900.0)));
        assert_eq!(fields.get("ABN_years"), Some(&FieldValue::Number(3.0)));
        assert_eq!(fields.get("loan_type"), Some(&FieldValue::Text("commercial".into())));
        assert!(!fields.contains_key("property_owner"));
        assert!(!fields.contains_key("asset_type"));
        assert!(!fields.contains_key("favourite_colour"));
    }

    #[tokio::test]
    async fn test_sends_transcript() {
        let (oracle, backend) = build(CannedBackend::ok("{}"));
        oracle
            .extract(&[Turn::assistant("Do you own property?"), Turn::user("yes")])
            .await
            .unwrap();

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].content.contains("Customer: yes"));
    }

    #[tokio::test]
    async fn test_errors() {
        let (oracle, _) = build(CannedBackend::ok("Sorry, I can't help with that."));
        assert!(matches!(
            oracle.extract(&[Turn::user("hi")]).await,
            Err(Error::Oracle(_))
        ));

        let (oracle, _) = build(CannedBackend::failing("HTTP 529: overloaded"));
        let err = oracle.extract(&[Turn::user("hi")]).await.unwrap_err();
        assert!(err.to_string().contains("529"));
    }

    #[tokio::test]
    async fn test_empty_window_skips_call() {
        let (oracle, backend) = build(CannedBackend::failing("should not be called"));
        assert!(oracle.extract(&[]).await.unwrap().is_empty());
        assert!(backend.seen.lock().unwrap().is_empty());
    }
}
