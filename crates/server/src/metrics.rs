//! Observability Metrics
//!
//! Prometheus metrics for turns, sessions, matching and errors.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::state::AppState;

/// Global Prometheus handle
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder
///
/// Call once at startup. A second call returns the existing handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_default_metrics();

    METRICS_HANDLE.get_or_init(|| handle.clone());
    Ok(handle)
}

/// Get the global metrics handle
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

fn register_default_metrics() {
    gauge!("loan_agent_sessions_active").set(0.0);
    counter!("loan_agent_sessions_created_total").absolute(0);
    counter!("loan_agent_sessions_evicted_total").absolute(0);

    counter!("loan_agent_requests_total", "endpoint" => "chat").absolute(0);
    counter!("loan_agent_requests_total", "endpoint" => "sessions").absolute(0);

    counter!("loan_agent_errors_total", "type" => "oracle").absolute(0);
    counter!("loan_agent_errors_total", "type" => "override").absolute(0);
    counter!("loan_agent_errors_total", "type" => "internal").absolute(0);
}

pub fn record_session_created() {
    counter!("loan_agent_sessions_created_total").increment(1);
}

pub fn record_sessions_evicted(count: usize) {
    counter!("loan_agent_sessions_evicted_total").increment(count as u64);
}

pub fn record_active_sessions(count: usize) {
    gauge!("loan_agent_sessions_active").set(count as f64);
}

pub fn record_request(endpoint: &'static str) {
    counter!("loan_agent_requests_total", "endpoint" => endpoint).increment(1);
}

/// Record a processed turn and the stage it ended in
pub fn record_turn(stage: &'static str, duration_secs: f64) {
    counter!("loan_agent_turns_total", "stage" => stage).increment(1);
    histogram!("loan_agent_turn_duration_seconds").record(duration_secs);
}

pub fn record_match_outcome(status: &'static str) {
    counter!("loan_agent_match_outcomes_total", "status" => status).increment(1);
}

pub fn record_error(error_type: &'static str) {
    counter!("loan_agent_errors_total", "type" => error_type).increment(1);
}

/// Metrics endpoint handler
///
/// Returns Prometheus-formatted metrics.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    record_active_sessions(state.sessions.count());

    match get_metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_helpers() {
        // No recorder installed: these are no-ops and must not panic
        record_request("chat");
        record_turn("GREETING", 0.01);
        record_match_outcome("full_match");
        record_sessions_evicted(2);
        record_error("oracle");
    }
}
