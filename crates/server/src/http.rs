//! HTTP Endpoints
//!
//! REST API for the loan intake agent.

use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use loan_agent_agent::{AgentError, RejectedOverride, TurnRequest};
use loan_agent_core::{FieldMap, ProductMatch, Stage, Turn};

use crate::metrics::{metrics_handler, record_error, record_match_outcome, record_request, record_turn};
use crate::state::AppState;
use crate::ServerError;

/// Reply sent when a turn fails for reasons the customer cannot fix
const TECHNICAL_ISSUE_REPLY: &str = "Sorry, we hit a technical issue. Please try again.";

const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state.config.server.cors_origins, state.config.server.cors_enabled);
    let timeout = Duration::from_secs(state.config.server.timeout_seconds);

    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - `enabled = false` allows every origin (development only)
/// - no valid origins falls back to localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "Invalid CORS origin");
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No valid CORS origins configured, defaulting to {}", DEFAULT_ORIGIN);
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static(DEFAULT_ORIGIN))
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

/// Chat request
#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    history: Option<Vec<Turn>>,
    #[serde(default)]
    manual_field_overrides: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Chat response
#[derive(Debug, Serialize)]
struct ChatResponse {
    session_id: String,
    reply: String,
    stage: Stage,
    profile: FieldMap,
    recommendations: Vec<ProductMatch>,
    next_questions: Vec<String>,
    round_count: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    rejected_overrides: Vec<RejectedOverride>,
}

/// Chat endpoint
///
/// Creates the session on first message. The session lock is held for the
/// whole turn so concurrent messages for one session queue up.
async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    record_request("chat");
    let started = Instant::now();

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return ServerError::InvalidRequest(rejection.body_text()).into_response();
        },
    };
    if request.message.trim().is_empty() {
        return ServerError::InvalidRequest("message must not be empty".into()).into_response();
    }

    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let entry = state.sessions.get_or_create(&session_id);

    let turn = TurnRequest {
        message: request.message,
        history: request.history,
        manual_field_overrides: request.manual_field_overrides,
    };

    let result = {
        let mut session = entry.session.lock().await;
        state.agent.process_turn(&mut session, turn).await
    };
    entry.touch();

    match result {
        Ok(outcome) => {
            record_turn(outcome.stage.as_str(), started.elapsed().as_secs_f64());
            if let Some(status) = outcome.match_status {
                record_match_outcome(status.as_str());
            }
            if outcome.oracle.is_failure() {
                record_error("oracle");
            }
            if !outcome.rejected_overrides.is_empty() {
                record_error("override");
            }

            Json(ChatResponse {
                session_id,
                reply: outcome.reply,
                stage: outcome.stage,
                profile: outcome.profile,
                recommendations: outcome.recommendations,
                next_questions: outcome.next_questions,
                round_count: outcome.round_count,
                rejected_overrides: outcome.rejected_overrides,
            })
            .into_response()
        },
        Err(AgentError::InvalidInput(message)) => ServerError::InvalidRequest(message).into_response(),
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "Chat turn failed");
            record_error("internal");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "reply": TECHNICAL_ISSUE_REPLY })),
            )
                .into_response()
        },
    }
}

/// Create a session with a server-assigned id
async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    record_request("sessions");
    let entry = state.sessions.create();
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "session_id": entry.id })),
    )
}

/// List sessions
async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    record_request("sessions");
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}

/// Session snapshot
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    record_request("sessions");
    let entry = state.sessions.get(&id).ok_or_else(|| ServerError::Session(id.clone()))?;
    let snapshot = entry.session.lock().await.snapshot();
    serde_json::to_value(snapshot)
        .map(Json)
        .map_err(|e| ServerError::Internal(e.to_string()))
}

/// Delete session
async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    record_request("sessions");
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::Session(id))
    }
}

/// Liveness
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.count(),
    }))
}

/// Readiness: the catalog must have products to match against
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let products = state.agent.catalog().len();
    let ready = state.is_ready();

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": {
                "catalog": {
                    "status": if ready { "ok" } else { "empty" },
                    "products": products,
                },
                "sessions": {
                    "status": "ok",
                    "count": state.sessions.count(),
                },
            }
        })),
    )
}
