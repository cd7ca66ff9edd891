//! Agent REST API Routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use deskline_core::{Agent, AgentId};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    types::RegisterAgentRequest,
};

/// POST /api/v1/agents - Register a new active agent
pub async fn register_agent(
    State(state): State<AppState>,
    Json(req): Json<RegisterAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation_failed("Required field 'name' is missing"));
    }
    let agent = state
        .directory()
        .register(Agent::new(req.name.trim(), req.skills))?;
    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /api/v1/agents - Every agent with its cached load
pub async fn list_agents(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.directory().snapshot())
}

/// POST /api/v1/agents/{id}/deactivate - Stop routing new tickets to an agent
pub async fn deactivate_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id: AgentId = id.parse()?;
    state.directory().deactivate(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/agents/{id}/activate
pub async fn activate_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id: AgentId = id.parse()?;
    state.directory().activate(id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(register_agent).get(list_agents))
        .route("/:id/deactivate", post(deactivate_agent))
        .route("/:id/activate", post(activate_agent))
}
