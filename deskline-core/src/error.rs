//! Error types for Deskline operations

use crate::{AgentId, EntityType, TicketId, TicketStatus, VersionToken};
use std::collections::BTreeSet;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: EntityType, id: String },

    #[error("Version conflict on ticket {ticket_id}: expected {expected}, found {actual}")]
    Conflict {
        ticket_id: TicketId,
        expected: VersionToken,
        actual: VersionToken,
    },

    #[error("Insert failed for {entity_type}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Storage I/O failed: {reason}")]
    Io { reason: String },
}

impl StorageError {
    /// Shorthand for a missing ticket.
    pub fn ticket_not_found(id: TicketId) -> Self {
        StorageError::NotFound {
            entity_type: EntityType::Ticket,
            id: id.to_string(),
        }
    }
}

/// Lifecycle transition errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition for ticket {ticket_id}: {from} -> {to}")]
    InvalidTransition {
        ticket_id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
    },

    #[error("Transition of ticket {ticket_id} to {to} was cancelled before commit")]
    Cancelled { ticket_id: TicketId, to: TicketStatus },
}

/// Ownership resolution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("No eligible agent for ticket {ticket_id} (required tags: {required_tags:?})")]
    NoEligibleAgent {
        ticket_id: TicketId,
        required_tags: BTreeSet<String>,
    },

    #[error("Agent not registered: {agent_id}")]
    AgentNotFound { agent_id: AgentId },

    #[error("Agent already registered: {agent_id}")]
    AlreadyRegistered { agent_id: AgentId },
}

/// Errors raised when handing an event to the notification dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Notification queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Notification dispatcher has shut down")]
    Closed,

    #[error("No configured notification channel named '{channel}'")]
    UnknownChannel { channel: String },
}

/// Errors reported by a notification channel for a single delivery attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Retryable delivery failure on {channel}: {reason}")]
    Retryable { channel: String, reason: String },

    #[error("Fatal delivery failure on {channel}: {reason}")]
    Fatal { channel: String, reason: String },
}

impl DeliveryError {
    pub fn retryable(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        DeliveryError::Retryable {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    pub fn fatal(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        DeliveryError::Fatal {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Retryable { .. })
    }
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Master error type for all Deskline errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DesklineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Assignment error: {0}")]
    Assignment(#[from] AssignmentError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl DesklineError {
    /// True for a stale version token; the caller should reload and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DesklineError::Storage(StorageError::Conflict { .. }))
    }

    /// True when the referenced entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DesklineError::Storage(StorageError::NotFound { .. }))
    }
}

/// Result type alias for Deskline operations.
pub type DesklineResult<T> = Result<T, DesklineError>;

// =============================================================================
// TESTS
// =============================================================================
