//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{llm, sessions};
use crate::{AgentConfig, ConfigError, FieldSchema, LlmConfig, LlmProvider};

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Conversation policy
    #[serde(default)]
    pub agent: AgentConfig,

    /// LLM oracle configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Session registry limits
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Lender documents
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Optional YAML file replacing the built-in field schema
    #[serde(default)]
    pub field_schema_path: Option<String>,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_agent()?;
        self.validate_llm()?;
        self.validate_sessions()?;
        Ok(())
    }

    /// Field schema from `field_schema_path`, or the built-in one
    pub fn field_schema(&self) -> Result<FieldSchema, ConfigError> {
        match &self.field_schema_path {
            Some(path) => FieldSchema::load(path).map_err(|e| ConfigError::InvalidValue {
                field: "field_schema_path".to_string(),
                message: e.to_string(),
            }),
            None => Ok(FieldSchema::default()),
        }
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }

    fn validate_agent(&self) -> Result<(), ConfigError> {
        let agent = &self.agent;

        if agent.max_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.max_rounds".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if agent.max_ask_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.max_ask_attempts".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if agent.questions_per_turn == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.questions_per_turn".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if agent.history_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.history_window".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if agent.max_recommendations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.max_recommendations".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm_config = &self.llm;

        if llm_config.timeout_secs == 0 || llm_config.timeout_secs > llm::TIMEOUT_MAX_SECS {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_secs".to_string(),
                message: format!(
                    "Must be between 1 and {}, got {}",
                    llm::TIMEOUT_MAX_SECS,
                    llm_config.timeout_secs
                ),
            });
        }

        if !(0.0..=1.0).contains(&llm_config.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", llm_config.temperature),
            });
        }

        if llm_config.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_tokens".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if llm_config.provider == LlmProvider::Claude && llm_config.resolved_api_key().is_none() {
            if self.environment.is_strict() {
                return Err(ConfigError::InvalidValue {
                    field: "llm.api_key".to_string(),
                    message: "API key must be set for the claude provider".to_string(),
                });
            }
            tracing::warn!("No LLM API key configured; extraction will use rules only");
        }

        Ok(())
    }

    fn validate_sessions(&self) -> Result<(), ConfigError> {
        if self.sessions.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sessions.max_sessions".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.sessions.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sessions.idle_timeout_secs".to_string(),
                message: "Must be at least 1 second".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: default_true(),
            // Empty means permissive in development; production must list origins
            cors_origins: Vec::new(),
        }
    }
}

/// Session registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Sessions idle longer than this are evicted
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_max_sessions() -> usize {
    sessions::MAX_SESSIONS
}
fn default_idle_timeout() -> u64 {
    sessions::IDLE_TIMEOUT_SECS
}
fn default_cleanup_interval() -> u64 {
    sessions::CLEANUP_INTERVAL_SECS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

/// A single lender document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LenderSource {
    /// Lender display name
    pub name: String,
    /// File name relative to `documents_dir`
    pub file: String,
}

/// Product catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_documents_dir")]
    pub documents_dir: String,

    #[serde(default = "default_lenders")]
    pub lenders: Vec<LenderSource>,
}

fn default_documents_dir() -> String {
    "data/lenders".to_string()
}

fn default_lenders() -> Vec<LenderSource> {
    [
        ("Angle Finance", "angle_finance.md"),
        ("BFS", "bfs.md"),
        ("FCAU", "fcau.md"),
        ("Plenti", "plenti.md"),
    ]
    .into_iter()
    .map(|(name, file)| LenderSource {
        name: name.to_string(),
        file: file.to_string(),
    })
    .collect()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            lenders: default_lenders(),
        }
    }
}

impl CatalogConfig {
    /// Full path of a lender document
    pub fn document_path(&self, lender: &LenderSource) -> PathBuf {
        Path::new(&self.documents_dir).join(&lender.file)
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (LOAN_AGENT__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from("config", env)
}

/// Same as [`load_settings`] with an explicit config directory
pub fn load_settings_from(dir: &str, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name(&format!("{}/default", dir)).required(false));

    if let Some(env_name) = env {
        builder = builder
            .add_source(File::with_name(&format!("{}/{}", dir, env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("LOAN_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_llm() -> Settings {
        let mut settings = Settings::default();
        settings.llm.provider = LlmProvider::Disabled;
        settings
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.agent.max_rounds, 8);
        assert_eq!(settings.sessions.max_sessions, 1000);
        assert_eq!(settings.catalog.documents_dir, "data/lenders");
        assert_eq!(settings.catalog.lenders.len(), 4);
    }

    #[test]
    fn test_server_validation() {
        let mut settings = disabled_llm();

        settings.server.port = 0;
        assert!(settings.validate_server().is_err());
        settings.server.port = 8080;

        settings.server.timeout_seconds = 0;
        assert!(settings.validate_server().is_err());
        settings.server.timeout_seconds = 30;

        assert!(settings.validate_server().is_ok());
    }

    #[test]
    fn test_agent_validation() {
        let mut settings = disabled_llm();
        settings.agent.max_rounds = 0;
        assert!(settings.validate().is_err());

        settings.agent.max_rounds = 8;
        settings.agent.questions_per_turn = 0;
        assert!(settings.validate_agent().is_err());
    }

    #[test]
    fn test_llm_timeout_bounds() {
        let mut settings = disabled_llm();

        settings.llm.timeout_secs = 0;
        assert!(settings.validate_llm().is_err());

        settings.llm.timeout_secs = 121;
        assert!(settings.validate_llm().is_err());

        settings.llm.timeout_secs = 120;
        assert!(settings.validate_llm().is_ok());
    }

    #[test]
    fn test_production_requires_api_key() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.llm.api_key = Some(String::new());
        // Empty configured key with no env key falls through to the env var
        if std::env::var("ANTHROPIC_API_KEY").is_err() {
            assert!(settings.validate_llm().is_err());
        }

        settings.llm.api_key = Some("sk-test".to_string());
        assert!(settings.validate_llm().is_ok());
    }

    #[test]
    fn test_session_validation() {
        let mut settings = disabled_llm();
        settings.sessions.max_sessions = 0;
        assert!(settings.validate_sessions().is_err());
    }

    #[test]
    fn test_load_from_yaml_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.yaml"),
            "agent:\n  max_rounds: 10\nllm:\n  provider: disabled\ncatalog:\n  documents_dir: docs\n  lenders:\n    - name: Acme\n      file: acme.md\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("staging.yaml"), "server:\n  port: 9000\n").unwrap();

        let path = dir.path().to_string_lossy().to_string();
        let settings = load_settings_from(&path, Some("staging")).unwrap();
        assert_eq!(settings.agent.max_rounds, 10);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.catalog.lenders[0].name, "Acme");
        assert_eq!(
            settings.catalog.document_path(&settings.catalog.lenders[0]),
            Path::new("docs").join("acme.md")
        );
    }

    #[test]
    fn test_field_schema_default_and_missing_file() {
        let mut settings = disabled_llm();
        assert!(settings.field_schema().unwrap().get("loan_type").is_some());

        settings.field_schema_path = Some("/nonexistent/fields.yaml".to_string());
        assert!(settings.field_schema().is_err());
    }
}
