use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use deploydesk_agent::SessionRegistry;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    sessions: Arc<SessionRegistry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub sessions: usize,
    pub checked_at: String,
}

pub fn router(sessions: Arc<SessionRegistry>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { sessions })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "deploydesk-server runtime initialized".to_string(),
        },
        sessions: state.sessions.len().await,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
