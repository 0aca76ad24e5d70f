//! Loan Agent Server
//!
//! HTTP API for the loan intake agent: chat, session management, health
//! and Prometheus metrics.

pub mod http;
pub mod metrics;
pub mod session;
pub mod state;

pub use http::create_router;
pub use metrics::{init_metrics, record_error, record_request};
pub use session::{SessionEntry, SessionManager};
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session not found: {0}")]
    Session(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let status: StatusCode = self.into();
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<loan_agent_config::ConfigError> for ServerError {
    fn from(err: loan_agent_config::ConfigError) -> Self {
        ServerError::Config(err.to_string())
    }
}

impl From<loan_agent_agent::AgentError> for ServerError {
    fn from(err: loan_agent_agent::AgentError) -> Self {
        match err {
            loan_agent_agent::AgentError::InvalidInput(message) => ServerError::InvalidRequest(message),
            loan_agent_agent::AgentError::Configuration(message) => ServerError::Config(message),
        }
    }
}
