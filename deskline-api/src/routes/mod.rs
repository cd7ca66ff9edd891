//! REST API Routes Module
//!
//! Routes are grouped per resource and nested under `/api/v1`:
//! - `/tickets` create, fetch, list, transition, history
//! - `/agents` register, list, activate/deactivate
//! - `/dead-letters` list and replay
//! - `/health` liveness

pub mod agents;
pub mod dead_letters;
pub mod health;
pub mod tickets;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the complete API router.
pub fn create_api_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/tickets", tickets::create_router())
        .nest("/agents", agents::create_router())
        .nest("/dead-letters", dead_letters::create_router())
        .nest("/health", health::create_router());

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
