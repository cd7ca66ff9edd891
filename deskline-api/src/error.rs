//! Error Types for the Deskline API
//!
//! Every handler returns [`ApiResult`]. Core errors convert through
//! `From<DesklineError>` so handlers can use `?` on engine and store calls;
//! the response body is always `{ code, message, details? }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use deskline_core::{
    AssignmentError, DesklineError, DispatchError, EntityIdParseError, StorageError,
    TransitionError,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error categories exposed to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Field format is incorrect
    InvalidFormat,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Transition not listed in the lifecycle table
    InvalidTransition,

    /// Optimistic version check kept failing
    ConcurrentModification,

    /// Caller cancelled before commit
    TransitionCancelled,

    /// Entity with the same identifier already exists
    EntityAlreadyExists,

    // ========================================================================
    // Unprocessable (422)
    // ========================================================================
    /// No active agent matches the ticket's required tags
    NoEligibleAgent,

    /// Replay names a channel the dispatcher does not have
    UnknownChannel,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Notification queue is full or stopped
    ServiceUnavailable,

    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// HTTP status for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,

            ErrorCode::InvalidTransition
            | ErrorCode::ConcurrentModification
            | ErrorCode::TransitionCancelled
            | ErrorCode::EntityAlreadyExists => StatusCode::CONFLICT,

            ErrorCode::NoEligibleAgent | ErrorCode::UnknownChannel => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM CORE ERRORS
// ============================================================================

impl From<DesklineError> for ApiError {
    fn from(err: DesklineError) -> Self {
        let message = err.to_string();
        match err {
            DesklineError::Storage(StorageError::NotFound { entity_type, id }) => {
                ApiError::new(ErrorCode::EntityNotFound, message).with_details(
                    serde_json::json!({ "entity_type": entity_type.to_string(), "id": id }),
                )
            }
            DesklineError::Storage(StorageError::Conflict {
                ticket_id,
                expected,
                actual,
            }) => ApiError::new(ErrorCode::ConcurrentModification, message).with_details(
                serde_json::json!({
                    "ticket_id": ticket_id,
                    "expected_version": expected.value(),
                    "actual_version": actual.value(),
                }),
            ),
            DesklineError::Storage(StorageError::InsertFailed { .. }) => {
                ApiError::new(ErrorCode::EntityAlreadyExists, message)
            }
            DesklineError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                ApiError::internal_error("Storage operation failed")
            }
            DesklineError::Transition(TransitionError::InvalidTransition {
                ticket_id,
                from,
                to,
            }) => ApiError::new(ErrorCode::InvalidTransition, message).with_details(
                serde_json::json!({ "ticket_id": ticket_id, "from": from, "to": to }),
            ),
            DesklineError::Transition(TransitionError::Cancelled { ticket_id, to }) => {
                ApiError::new(ErrorCode::TransitionCancelled, message)
                    .with_details(serde_json::json!({ "ticket_id": ticket_id, "to": to }))
            }
            DesklineError::Assignment(AssignmentError::NoEligibleAgent {
                ticket_id,
                required_tags,
            }) => ApiError::new(ErrorCode::NoEligibleAgent, message).with_details(
                serde_json::json!({ "ticket_id": ticket_id, "required_tags": required_tags }),
            ),
            DesklineError::Assignment(AssignmentError::AgentNotFound { .. }) => {
                ApiError::new(ErrorCode::EntityNotFound, message)
            }
            DesklineError::Assignment(AssignmentError::AlreadyRegistered { .. }) => {
                ApiError::new(ErrorCode::EntityAlreadyExists, message)
            }
            DesklineError::Dispatch(DispatchError::UnknownChannel { channel }) => {
                ApiError::new(ErrorCode::UnknownChannel, message)
                    .with_details(serde_json::json!({ "channel": channel }))
            }
            DesklineError::Dispatch(_) => ApiError::new(ErrorCode::ServiceUnavailable, message),
            DesklineError::Validation(_) => ApiError::validation_failed(message),
            DesklineError::Delivery(_) | DesklineError::Config(_) => {
                tracing::error!(error = %message, "Unexpected error in request path");
                ApiError::internal_error(message)
            }
        }
    }
}

impl From<AssignmentError> for ApiError {
    fn from(err: AssignmentError) -> Self {
        DesklineError::from(err).into()
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        DesklineError::from(err).into()
    }
}

impl From<EntityIdParseError> for ApiError {
    fn from(err: EntityIdParseError) -> Self {
        ApiError::invalid_format("id", &format!("{} uuid", err.entity))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

pub type ApiResult<T> = Result<T, ApiError>;
