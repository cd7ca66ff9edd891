//! Ticket REST API Routes
//!
//! Each handler is a direct translation to one store or engine call.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use deskline_core::{Actor, NewTicket, TicketId};
use deskline_engine::TransitionRequest;
use deskline_storage::PageCursor;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    types::{
        ListTicketsQuery, TicketListResponse, TransitionBody, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT,
    },
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/tickets - Create a ticket in status New
pub async fn create_ticket(
    State(state): State<AppState>,
    Json(req): Json<NewTicket>,
) -> ApiResult<impl IntoResponse> {
    let ticket = state.store().create(req)?;
    tracing::info!(ticket_id = %ticket.ticket_id, priority = %ticket.priority, "Ticket created");
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// GET /api/v1/tickets/{id}
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id: TicketId = id.parse()?;
    Ok(Json(state.store().get(id)?))
}

/// GET /api/v1/tickets?status=&limit=&cursor=
pub async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<ListTicketsQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit == 0 || limit > MAX_LIST_LIMIT {
        return Err(ApiError::validation_failed(format!(
            "limit must be between 1 and {}",
            MAX_LIST_LIMIT
        )));
    }
    let after = query
        .cursor
        .as_deref()
        .map(|c| c.parse::<PageCursor>())
        .transpose()
        .map_err(deskline_core::DesklineError::from)?;

    let page = state.store().list_page(query.status, after, limit)?;
    Ok(Json(TicketListResponse {
        tickets: page.tickets,
        next_cursor: page.next.map(|c| c.to_string()),
    }))
}

/// POST /api/v1/tickets/{id}/transitions - Apply a lifecycle transition
pub async fn apply_transition(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> ApiResult<impl IntoResponse> {
    let id: TicketId = id.parse()?;
    let mut request =
        TransitionRequest::new(id, body.target).with_actor(body.actor.unwrap_or(Actor::Unattributed));
    if let Some(note) = body.note {
        request = request.with_note(note);
    }
    let event = state.engine.apply_transition(request).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /api/v1/tickets/{id}/events - Audit history in sequence order
pub async fn list_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id: TicketId = id.parse()?;
    Ok(Json(state.store().events(id)?))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_ticket).get(list_tickets))
        .route("/:id", get(get_ticket))
        .route("/:id/transitions", post(apply_transition))
        .route("/:id/events", get(list_events))
}
