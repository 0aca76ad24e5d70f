//! Dialogue State Tracking for the intake conversation
//!
//! [`CustomerProfile`] is the single source of truth for what the customer
//! has told us. It records values, which fields were asked and how often,
//! which were confirmed, and a change log of every value update.
//!
//! ## Invariants
//!
//! - A confirmed field always has a value.
//! - Values can be overwritten but never removed, except by [`CustomerProfile::reset`].
//! - Required fields are resolved from the schema on every call, so the
//!   vehicle fields appear as soon as `asset_type` becomes `motor_vehicle`.

pub mod reconciler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use loan_agent_config::{FieldDefinition, FieldSchema};
use loan_agent_core::{FieldMap, FieldValue};

/// Record of a profile change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub timestamp: DateTime<Utc>,
    pub field: String,
    pub old_value: Option<FieldValue>,
    pub new_value: FieldValue,
    /// Customer round in which the change happened
    pub round: u32,
    pub source: ChangeSource,
}

/// Source of a profile change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// Reconciled from the conversation
    Extraction,
    /// Manual override sent with the request
    Override,
}

/// Customer profile for one session
#[derive(Debug, Clone, Default)]
pub struct CustomerProfile {
    values: FieldMap,
    asked: BTreeSet<String>,
    confirmed: BTreeSet<String>,
    ask_attempts: BTreeMap<String, u32>,
    changes: Vec<StateChange>,
}

impl CustomerProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge field deltas, returning how many values actually changed
    ///
    /// Every delta marks its field confirmed and asked, even when the value
    /// is unchanged.
    pub fn merge(&mut self, deltas: FieldMap, round: u32, source: ChangeSource) -> usize {
        let mut changed = 0;

        for (field, value) in deltas {
            self.asked.insert(field.clone());
            self.confirmed.insert(field.clone());

            let old_value = self.values.insert(field.clone(), value.clone());
            if old_value.as_ref() == Some(&value) {
                continue;
            }

            tracing::debug!(
                field = %field,
                old = ?old_value,
                new = %value,
                round = round,
                source = ?source,
                "Profile field updated"
            );
            self.changes.push(StateChange {
                timestamp: Utc::now(),
                field,
                old_value,
                new_value: value,
                round,
                source,
            });
            changed += 1;
        }

        changed
    }

    /// Record that a field's question was sent
    pub fn mark_asked(&mut self, field: &str) {
        self.asked.insert(field.to_string());
        *self.ask_attempts.entry(field.to_string()).or_insert(0) += 1;
    }

    pub fn ask_attempts(&self, field: &str) -> u32 {
        self.ask_attempts.get(field).copied().unwrap_or(0)
    }

    /// Value present and confirmed
    pub fn is_complete(&self, field: &str) -> bool {
        self.values.contains_key(field) && self.confirmed.contains(field)
    }

    /// Required fields for the current values, ascending priority
    pub fn required_fields<'a>(&self, schema: &'a FieldSchema) -> Vec<&'a FieldDefinition> {
        schema.required_fields(&self.values)
    }

    /// Required fields that are not complete, ascending priority
    pub fn missing_required(&self, schema: &FieldSchema) -> Vec<String> {
        self.required_fields(schema)
            .into_iter()
            .filter(|f| !self.is_complete(&f.name))
            .map(|f| f.name.clone())
            .collect()
    }

    /// Preference fields without a value, ascending priority
    pub fn missing_preferences(&self, schema: &FieldSchema) -> Vec<String> {
        schema
            .preference_fields()
            .into_iter()
            .filter(|f| !self.values.contains_key(&f.name))
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn has_preference(&self, schema: &FieldSchema) -> bool {
        self.values.keys().any(|name| schema.is_preference(name))
    }

    pub fn has_any_value(&self) -> bool {
        !self.values.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn values(&self) -> &FieldMap {
        &self.values
    }

    pub fn asked(&self) -> &BTreeSet<String> {
        &self.asked
    }

    pub fn confirmed(&self) -> &BTreeSet<String> {
        &self.confirmed
    }

    pub fn attempts(&self) -> &BTreeMap<String, u32> {
        &self.ask_attempts
    }

    pub fn changes(&self) -> &[StateChange] {
        &self.changes
    }

    /// Clear everything for a new application
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loan_agent_config::constants::fields;

    fn deltas(pairs: &[(&str, FieldValue)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_merge_counts_changes() {
        let mut profile = CustomerProfile::new();
        let changed = profile.merge(
            deltas(&[
                (fields::CREDIT_SCORE, 720.0.into()),
                (fields::PROPERTY_OWNER, true.into()),
            ]),
            1,
            ChangeSource::Extraction,
        );
        assert_eq!(changed, 2);
        assert!(profile.is_complete(fields::CREDIT_SCORE));
        assert!(profile.asked().contains(fields::PROPERTY_OWNER));

        // Same value again is not a change, a new one is
        let changed = profile.merge(
            deltas(&[
                (fields::CREDIT_SCORE, 720.0.into()),
                (fields::PROPERTY_OWNER, false.into()),
            ]),
            2,
            ChangeSource::Override,
        );
        assert_eq!(changed, 1);
        assert_eq!(profile.changes().len(), 3);

        let last = profile.changes().last().unwrap();
        assert_eq!(last.old_value, Some(FieldValue::Bool(true)));
        assert_eq!(last.round, 2);
        assert_eq!(last.source, ChangeSource::Override);
    }

    #[test]
    fn test_confirmed_fields_keep_values() {
        let mut profile = CustomerProfile::new();
        profile.merge(deltas(&[(fields::ABN_YEARS, 3.0.into())]), 1, ChangeSource::Extraction);
        profile.merge(FieldMap::new(), 2, ChangeSource::Extraction);

        assert_eq!(profile.get(fields::ABN_YEARS), Some(&FieldValue::Number(3.0)));
        for field in profile.confirmed() {
            assert!(profile.get(field).is_some());
        }
    }

    #[test]
    fn test_ask_attempts() {
        let mut profile = CustomerProfile::new();
        assert_eq!(profile.ask_attempts(fields::GST_YEARS), 0);
        profile.mark_asked(fields::GST_YEARS);
        profile.mark_asked(fields::GST_YEARS);
        assert_eq!(profile.ask_attempts(fields::GST_YEARS), 2);
        assert!(!profile.is_complete(fields::GST_YEARS));
    }

    #[test]
    fn test_vehicle_fields_join_required_set() {
        let schema = FieldSchema::loan_intake();
        let mut profile = CustomerProfile::new();
        assert!(!profile.missing_required(&schema).contains(&fields::VEHICLE_TYPE.to_string()));

        profile.merge(
            deltas(&[(fields::ASSET_TYPE, "motor_vehicle".into())]),
            1,
            ChangeSource::Extraction,
        );
        let missing = profile.missing_required(&schema);
        assert!(missing.contains(&fields::VEHICLE_TYPE.to_string()));
        assert!(missing.contains(&fields::VEHICLE_CONDITION.to_string()));
        assert!(!missing.contains(&fields::ASSET_TYPE.to_string()));

        profile.merge(
            deltas(&[(fields::ASSET_TYPE, "equipment".into())]),
            2,
            ChangeSource::Extraction,
        );
        assert!(!profile.missing_required(&schema).contains(&fields::VEHICLE_TYPE.to_string()));
    }

    #[test]
    fn test_missing_required_in_priority_order() {
        let schema = FieldSchema::loan_intake();
        let mut profile = CustomerProfile::new();
        profile.merge(deltas(&[(fields::LOAN_TYPE, "commercial".into())]), 1, ChangeSource::Extraction);

        let missing = profile.missing_required(&schema);
        assert_eq!(missing[0], fields::ASSET_TYPE);
        assert_eq!(missing.last().map(String::as_str), Some(fields::GST_YEARS));
    }

    #[test]
    fn test_preferences_and_reset() {
        let schema = FieldSchema::loan_intake();
        let mut profile = CustomerProfile::new();
        assert!(!profile.has_preference(&schema));
        assert_eq!(profile.missing_preferences(&schema).len(), 3);

        profile.merge(
            deltas(&[(fields::MONTHLY_BUDGET, 900.0.into())]),
            1,
            ChangeSource::Extraction,
        );
        assert!(profile.has_preference(&schema));
        assert_eq!(profile.missing_preferences(&schema).len(), 2);

        profile.reset();
        assert!(!profile.has_any_value());
        assert!(profile.asked().is_empty());
        assert!(profile.changes().is_empty());
    }
}
