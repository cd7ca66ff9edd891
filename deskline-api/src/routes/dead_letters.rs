//! Dead-letter inspection and replay.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use deskline_core::LetterId;

use crate::{error::ApiResult, state::AppState};

/// GET /api/v1/dead-letters - Every held letter, oldest first
pub async fn list_dead_letters(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.dead_letters.list().await?))
}

/// POST /api/v1/dead-letters/{id}/replay - Requeue a letter for its channel
///
/// The letter is removed from the store first; if the queue rejects it, it is
/// recorded again so it is not lost.
pub async fn replay_dead_letter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id: LetterId = id.parse()?;
    let letter = state.dead_letters.take(id).await?;

    if let Err(e) = state.notifier().replay(letter.clone()).await {
        tracing::warn!(letter_id = %id, error = %e, "Replay rejected, keeping dead letter");
        state.dead_letters.record(letter).await?;
        return Err(e.into());
    }

    Ok((StatusCode::ACCEPTED, Json(letter)))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_dead_letters))
        .route("/:id/replay", post(replay_dead_letter))
}
