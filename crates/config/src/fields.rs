//! Field Schema Configuration
//!
//! Defines the profile fields the agent collects: their types, priorities,
//! validation ranges and question phrasing. The built-in loan intake schema
//! can be replaced by a YAML file with the same shape.
//!
//! Requirement is resolved against the current profile values on every call
//! (see [`FieldSchema::required_fields`]), so conditional fields such as the
//! vehicle attributes join the required set only while their condition holds.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use loan_agent_core::{FieldMap, FieldValue};

use crate::constants::{fields, ranges};

/// Field schema errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldSchemaError {
    #[error("Schema file not found: {0} ({1})")]
    FileNotFound(String, String),

    #[error("Failed to parse schema: {0}")]
    ParseError(String),

    #[error("Invalid schema: {0}")]
    Invalid(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field {field} expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("Field {field} value {value} outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Field {field} does not accept '{value}'")]
    InvalidOption { field: String, value: String },
}

/// Field type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Enum,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Enum => "enum",
        }
    }
}

/// Which part of the conversation collects the field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldGroup {
    #[default]
    Mvp,
    Vehicle,
    Preference,
    Optional,
}

/// Numeric validation
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Validation {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub integer: bool,
}

/// Makes a field required while another field holds a given value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequiredWhen {
    pub field: String,
    pub equals: String,
}

/// How out-of-range numbers are treated by [`FieldSchema::coerce`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoerceMode {
    /// Clamp into range and truncate integers (extraction)
    Clamp,
    /// Reject anything outside the declared range (manual overrides)
    Strict,
}

/// Definition for a single field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub group: FieldGroup,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub required_when: Option<RequiredWhen>,
    pub priority: u32,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub validation: Option<Validation>,
    /// Primary question text
    #[serde(default)]
    pub question: String,
    /// Alternate phrasing used when the primary was asked recently
    #[serde(default)]
    pub reask: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl FieldDefinition {
    fn new(name: &str, field_type: FieldType, group: FieldGroup, priority: u32) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            group,
            required: group == FieldGroup::Mvp,
            required_when: None,
            priority,
            options: Vec::new(),
            validation: None,
            question: String::new(),
            reask: None,
            description: String::new(),
        }
    }

    fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|s| s.to_string()).collect();
        self
    }

    fn range(mut self, min: f64, max: f64, integer: bool) -> Self {
        self.validation = Some(Validation {
            min: Some(min),
            max: Some(max),
            integer,
        });
        self
    }

    fn ask(mut self, question: &str, reask: &str) -> Self {
        self.question = question.to_string();
        self.reask = Some(reask.to_string());
        self
    }

    fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    fn required_when(mut self, field: &str, equals: &str) -> Self {
        self.required = false;
        self.required_when = Some(RequiredWhen {
            field: field.to_string(),
            equals: equals.to_string(),
        });
        self
    }

    fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Whether the field is required given the current profile values
    pub fn is_required(&self, values: &FieldMap) -> bool {
        if self.required {
            return true;
        }
        match &self.required_when {
            Some(cond) => values
                .get(&cond.field)
                .and_then(|v| v.as_str())
                .is_some_and(|v| v == cond.equals),
            None => false,
        }
    }

    /// Question to send, switching to the alternate phrasing when the
    /// primary one appears in `recent`
    pub fn question_text<'a>(&'a self, recent: &[String]) -> &'a str {
        match &self.reask {
            Some(reask) if recent.iter().any(|q| q == &self.question) => reask,
            _ => &self.question,
        }
    }

    /// Convert a raw JSON value into a typed field value
    pub fn coerce(
        &self,
        raw: &serde_json::Value,
        mode: CoerceMode,
    ) -> Result<FieldValue, FieldSchemaError> {
        match self.field_type {
            FieldType::Number => {
                let number = match raw {
                    serde_json::Value::Number(n) => n.as_f64(),
                    serde_json::Value::String(s) => parse_number(s),
                    _ => None,
                }
                .ok_or_else(|| self.type_mismatch(raw))?;
                self.check_number(number, mode).map(FieldValue::Number)
            },
            FieldType::Boolean => match raw {
                serde_json::Value::Bool(b) => Ok(FieldValue::Bool(*b)),
                serde_json::Value::String(s) => parse_bool(s)
                    .map(FieldValue::Bool)
                    .ok_or_else(|| self.type_mismatch(raw)),
                _ => Err(self.type_mismatch(raw)),
            },
            FieldType::Enum => {
                let s = raw.as_str().ok_or_else(|| self.type_mismatch(raw))?;
                self.check_option(s).map(FieldValue::Text)
            },
            FieldType::String => match raw {
                serde_json::Value::String(s) if !s.trim().is_empty() => {
                    Ok(FieldValue::Text(s.trim().to_string()))
                },
                _ => Err(self.type_mismatch(raw)),
            },
        }
    }

    /// Validate an already-typed value
    pub fn normalize(
        &self,
        value: FieldValue,
        mode: CoerceMode,
    ) -> Result<FieldValue, FieldSchemaError> {
        match (self.field_type, value) {
            (FieldType::Number, FieldValue::Number(n)) => {
                self.check_number(n, mode).map(FieldValue::Number)
            },
            (FieldType::Boolean, v @ FieldValue::Bool(_)) => Ok(v),
            (FieldType::Enum, FieldValue::Text(s)) => self.check_option(&s).map(FieldValue::Text),
            (FieldType::String, v @ FieldValue::Text(_)) => Ok(v),
            (_, other) => Err(FieldSchemaError::TypeMismatch {
                field: self.name.clone(),
                expected: self.field_type.name(),
                found: other.kind().to_string(),
            }),
        }
    }

    fn check_number(&self, number: f64, mode: CoerceMode) -> Result<f64, FieldSchemaError> {
        if !number.is_finite() {
            return Err(FieldSchemaError::OutOfRange {
                field: self.name.clone(),
                value: number,
                min: f64::MIN,
                max: f64::MAX,
            });
        }
        let Some(validation) = &self.validation else {
            return Ok(number);
        };
        let min = validation.min.unwrap_or(f64::MIN);
        let max = validation.max.unwrap_or(f64::MAX);

        match mode {
            CoerceMode::Clamp => {
                let clamped = number.clamp(min, max);
                Ok(if validation.integer { clamped.trunc() } else { clamped })
            },
            CoerceMode::Strict => {
                if number < min || number > max {
                    return Err(FieldSchemaError::OutOfRange {
                        field: self.name.clone(),
                        value: number,
                        min,
                        max,
                    });
                }
                if validation.integer && number.fract() != 0.0 {
                    return Err(FieldSchemaError::TypeMismatch {
                        field: self.name.clone(),
                        expected: "integer",
                        found: number.to_string(),
                    });
                }
                Ok(number)
            },
        }
    }

    fn check_option(&self, raw: &str) -> Result<String, FieldSchemaError> {
        let normalized = normalize_option(raw);
        if self.options.iter().any(|o| *o == normalized) {
            Ok(normalized)
        } else {
            Err(FieldSchemaError::InvalidOption {
                field: self.name.clone(),
                value: raw.to_string(),
            })
        }
    }

    fn type_mismatch(&self, raw: &serde_json::Value) -> FieldSchemaError {
        FieldSchemaError::TypeMismatch {
            field: self.name.clone(),
            expected: self.field_type.name(),
            found: raw.to_string(),
        }
    }
}

fn normalize_option(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace(['-', ' '], "_")
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | ' '))
        .collect();
    cleaned.parse::<f64>().ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" => Some(true),
        "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Field schema loaded from YAML or built in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub fields: Vec<FieldDefinition>,
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::loan_intake()
    }
}

impl FieldSchema {
    /// Load from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FieldSchemaError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            FieldSchemaError::FileNotFound(path.as_ref().display().to_string(), e.to_string())
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self, FieldSchemaError> {
        let mut schema: FieldSchema = serde_yaml::from_str(content)
            .map_err(|e| FieldSchemaError::ParseError(e.to_string()))?;
        schema.validate()?;
        schema.fields.sort_by_key(|f| f.priority);
        Ok(schema)
    }

    fn validate(&self) -> Result<(), FieldSchemaError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(FieldSchemaError::Invalid(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
            if field.field_type == FieldType::Enum && field.options.is_empty() {
                return Err(FieldSchemaError::Invalid(format!(
                    "enum field '{}' has no options",
                    field.name
                )));
            }
        }
        for field in &self.fields {
            if let Some(cond) = &field.required_when {
                if !seen.contains(cond.field.as_str()) {
                    return Err(FieldSchemaError::Invalid(format!(
                        "field '{}' depends on unknown field '{}'",
                        field.name, cond.field
                    )));
                }
            }
        }
        Ok(())
    }

    /// The canonical loan intake schema
    pub fn loan_intake() -> Self {
        use FieldGroup::*;
        use FieldType::*;

        let fields = vec![
            FieldDefinition::new(fields::LOAN_TYPE, Enum, Mvp, 1)
                .options(&["consumer", "commercial"])
                .ask(
                    "Is this loan for personal use or for your business?",
                    "Just to confirm, is the finance for personal or business use?",
                )
                .describe("Consumer or commercial finance"),
            FieldDefinition::new(fields::ASSET_TYPE, Enum, Mvp, 2)
                .options(&["motor_vehicle", "equipment", "machinery"])
                .ask(
                    "What are you looking to finance: a vehicle, equipment or machinery?",
                    "Which type of asset is the loan for (vehicle, equipment or machinery)?",
                ),
            FieldDefinition::new(fields::DESIRED_LOAN_AMOUNT, Number, Mvp, 3)
                .range(ranges::LOAN_AMOUNT_MIN, ranges::LOAN_AMOUNT_MAX, false)
                .ask(
                    "How much would you like to borrow?",
                    "Roughly what loan amount do you have in mind?",
                ),
            FieldDefinition::new(fields::CREDIT_SCORE, Number, Mvp, 4)
                .range(ranges::CREDIT_SCORE_MIN, ranges::CREDIT_SCORE_MAX, true)
                .ask(
                    "Do you know your credit score?",
                    "If you have it handy, what is your approximate credit score?",
                ),
            FieldDefinition::new(fields::PROPERTY_OWNER, Boolean, Mvp, 5).ask(
                "Do you own property, such as your home?",
                "Are you currently a property owner?",
            ),
            FieldDefinition::new(fields::ABN_YEARS, Number, Mvp, 6)
                .range(ranges::YEARS_MIN, ranges::YEARS_MAX, true)
                .ask(
                    "How many years has your ABN been registered?",
                    "How long have you held an ABN (say 'no ABN' if you don't have one)?",
                ),
            FieldDefinition::new(fields::GST_YEARS, Number, Mvp, 7)
                .range(ranges::YEARS_MIN, ranges::YEARS_MAX, true)
                .ask(
                    "How many years have you been registered for GST?",
                    "How long have you been GST registered (or are you not registered)?",
                ),
            FieldDefinition::new(fields::VEHICLE_TYPE, Enum, Vehicle, 8)
                .options(&["passenger", "light_commercial", "heavy_commercial", "motorcycle"])
                .required_when(fields::ASSET_TYPE, fields::VEHICLE_ASSET)
                .ask(
                    "What kind of vehicle is it: a car, ute or van, truck, or motorbike?",
                    "Which vehicle type is it (car, ute/van, truck or motorbike)?",
                ),
            FieldDefinition::new(fields::VEHICLE_CONDITION, Enum, Vehicle, 9)
                .options(&["new", "demo", "used"])
                .required_when(fields::ASSET_TYPE, fields::VEHICLE_ASSET)
                .ask(
                    "Is the vehicle new, demo or used?",
                    "Will you be buying it new, as a demo, or used?",
                ),
            FieldDefinition::new(fields::BUSINESS_STRUCTURE, Enum, Optional, 10)
                .options(&["sole_trader", "company", "trust", "partnership"])
                .optional()
                .ask(
                    "How is your business structured (sole trader, company, trust or partnership)?",
                    "What is your business structure?",
                ),
            FieldDefinition::new(fields::INTEREST_RATE_CEILING, Number, Preference, 20)
                .range(0.0, ranges::RATE_CEILING_MAX, false)
                .optional()
                .ask(
                    "Is there a maximum interest rate you'd be comfortable with?",
                    "Do you have an interest rate you'd like to stay under?",
                ),
            FieldDefinition::new(fields::MONTHLY_BUDGET, Number, Preference, 21)
                .range(ranges::MONTHLY_BUDGET_MIN, ranges::MONTHLY_BUDGET_MAX, false)
                .optional()
                .ask(
                    "What monthly repayment would suit your budget?",
                    "Is there a monthly repayment you'd like to keep under?",
                ),
            FieldDefinition::new(fields::PREFERRED_TERM_MONTHS, Number, Preference, 22)
                .range(ranges::TERM_MONTHS_MIN, ranges::TERM_MONTHS_MAX, true)
                .optional()
                .ask(
                    "Over how many years would you like to repay the loan?",
                    "Do you have a preferred loan term?",
                ),
        ];

        Self { fields }
    }

    /// Get a field definition by name
    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All fields in ascending priority order
    pub fn iter(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter()
    }

    /// Required fields for the given profile values, ascending priority
    ///
    /// Conditional requirements are evaluated against `values` on every
    /// call; nothing is cached.
    pub fn required_fields(&self, values: &FieldMap) -> Vec<&FieldDefinition> {
        let mut required: Vec<&FieldDefinition> =
            self.fields.iter().filter(|f| f.is_required(values)).collect();
        required.sort_by_key(|f| f.priority);
        required
    }

    /// Preference fields, ascending priority
    pub fn preference_fields(&self) -> Vec<&FieldDefinition> {
        let mut prefs: Vec<&FieldDefinition> = self
            .fields
            .iter()
            .filter(|f| f.group == FieldGroup::Preference)
            .collect();
        prefs.sort_by_key(|f| f.priority);
        prefs
    }

    pub fn is_preference(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|f| f.group == FieldGroup::Preference)
    }

    /// Coerce a raw JSON value for a named field
    pub fn coerce(
        &self,
        name: &str,
        raw: &serde_json::Value,
        mode: CoerceMode,
    ) -> Result<FieldValue, FieldSchemaError> {
        self.get(name)
            .ok_or_else(|| FieldSchemaError::UnknownField(name.to_string()))?
            .coerce(raw, mode)
    }

    /// Validate a typed value for a named field
    pub fn normalize(
        &self,
        name: &str,
        value: FieldValue,
        mode: CoerceMode,
    ) -> Result<FieldValue, FieldSchemaError> {
        self.get(name)
            .ok_or_else(|| FieldSchemaError::UnknownField(name.to_string()))?
            .normalize(value, mode)
    }
}
