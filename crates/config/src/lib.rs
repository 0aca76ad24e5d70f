//! Configuration management for the loan intake agent
//!
//! Supports loading configuration from:
//! - YAML files (config/default.yaml, config/{env}.yaml)
//! - Environment variables (LOAN_AGENT__ prefix, `__` separator)
//!
//! The field schema lives here as well: the built-in loan intake schema or
//! a YAML replacement named by `field_schema_path`.

pub mod agent;
pub mod constants;
pub mod fields;
pub mod settings;

pub use agent::{AgentConfig, LlmConfig, LlmProvider};
pub use fields::{
    CoerceMode, FieldDefinition, FieldGroup, FieldSchema, FieldSchemaError, FieldType,
    RequiredWhen, Validation,
};
pub use settings::{
    load_settings, load_settings_from, CatalogConfig, LenderSource, ObservabilityConfig,
    RuntimeEnvironment, ServerConfig, SessionConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<FieldSchemaError> for ConfigError {
    fn from(err: FieldSchemaError) -> Self {
        ConfigError::InvalidValue {
            field: "field_schema".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<ConfigError> for loan_agent_core::Error {
    fn from(err: ConfigError) -> Self {
        loan_agent_core::Error::Config(err.to_string())
    }
}
