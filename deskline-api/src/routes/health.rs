//! Liveness endpoint. No core logic, no authentication.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};

use crate::{
    state::AppState,
    types::{HealthResponse, HealthStatus},
};

/// GET /api/v1/health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        agents: state.directory().len(),
        dispatcher: state.notifier().metrics().snapshot(),
    })
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(health))
}
