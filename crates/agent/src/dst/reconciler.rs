//! Extraction reconciliation
//!
//! Combines the extraction oracle with the rule-based extractor. The oracle
//! sees a trailing window of the conversation; the rules read each user
//! turn once. Per field the oracle wins, rules fill the rest.
//!
//! Only fresh values are returned. An [`ExtractionCursor`] kept with the
//! session records which turns the rules have read and what the oracle said
//! last time, so text from earlier turns never rewrites a value that a later
//! override or oracle answer replaced.

use std::sync::Arc;
use std::time::Duration;

use loan_agent_config::{CoerceMode, FieldSchema};
use loan_agent_core::{ExtractionOracle, FieldMap, Turn};
use loan_agent_text_processing::FieldExtractor;

/// What happened to the oracle call this turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleStatus {
    /// No oracle configured
    Disabled,
    Ok,
    Failed,
    TimedOut,
}

impl OracleStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, OracleStatus::Failed | OracleStatus::TimedOut)
    }
}

/// Reconciled fields plus the oracle outcome
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub fields: FieldMap,
    pub oracle: OracleStatus,
}

/// Per-session record of what extraction has already produced
#[derive(Debug, Clone, Default)]
pub struct ExtractionCursor {
    /// Index of the first turn the rules have not read
    next_turn: usize,
    /// Output of the last successful oracle call
    last_oracle: FieldMap,
}

impl ExtractionCursor {
    pub fn next_turn(&self) -> usize {
        self.next_turn
    }
}

/// Produces field deltas from conversation history
pub struct ExtractionReconciler {
    oracle: Option<Arc<dyn ExtractionOracle>>,
    extractor: FieldExtractor,
    schema: Arc<FieldSchema>,
    history_window: usize,
    timeout: Duration,
}

impl ExtractionReconciler {
    pub fn new(
        oracle: Option<Arc<dyn ExtractionOracle>>,
        schema: Arc<FieldSchema>,
        history_window: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            extractor: FieldExtractor::new(),
            schema,
            history_window,
            timeout,
        }
    }

    /// Rules-only reconciler
    pub fn rules_only(schema: Arc<FieldSchema>) -> Self {
        Self::new(None, schema, 0, Duration::ZERO)
    }

    /// Reconcile new conversation turns into field deltas; never fails
    ///
    /// Rules read the turns from `cursor` onwards. Oracle values are kept
    /// only where they differ from the oracle's previous answer. A fresh
    /// cursor over a fixed history always yields the same rule values.
    pub async fn reconcile(&self, history: &[Turn], cursor: &mut ExtractionCursor) -> Reconciled {
        let (oracle_fields, oracle) = self.call_oracle(history).await;

        let start = cursor.next_turn.min(history.len());
        let mut fields = self.rule_fields(&history[start..]);
        cursor.next_turn = history.len();

        if oracle == OracleStatus::Ok {
            for (name, value) in &oracle_fields {
                if cursor.last_oracle.get(name) != Some(value) {
                    fields.insert(name.clone(), value.clone());
                }
            }
            cursor.last_oracle = oracle_fields;
        }

        Reconciled { fields, oracle }
    }

    async fn call_oracle(&self, history: &[Turn]) -> (FieldMap, OracleStatus) {
        let Some(oracle) = &self.oracle else {
            return (FieldMap::new(), OracleStatus::Disabled);
        };

        let start = history.len().saturating_sub(self.history_window);
        let window = &history[start..];

        match tokio::time::timeout(self.timeout, oracle.extract(window)).await {
            Ok(Ok(fields)) => {
                tracing::debug!(oracle = oracle.name(), fields = fields.len(), "Oracle extraction");
                (fields, OracleStatus::Ok)
            },
            Ok(Err(e)) => {
                tracing::warn!(oracle = oracle.name(), error = %e, "Extraction oracle failed, using rules");
                (FieldMap::new(), OracleStatus::Failed)
            },
            Err(_) => {
                tracing::warn!(
                    oracle = oracle.name(),
                    timeout_secs = self.timeout.as_secs(),
                    "Extraction oracle timed out, using rules"
                );
                (FieldMap::new(), OracleStatus::TimedOut)
            },
        }
    }

    /// Rule values passed through the schema; anything it rejects is dropped
    fn rule_fields(&self, history: &[Turn]) -> FieldMap {
        self.extractor
            .extract_history(history)
            .into_iter()
            .filter_map(|(name, value)| {
                match self.schema.normalize(&name, value, CoerceMode::Clamp) {
                    Ok(value) => Some((name, value)),
                    Err(e) => {
                        tracing::debug!(field = %name, error = %e, "Dropping rule value");
                        None
                    },
                }
            })
            .collect()
    }
}
