//! Deskline Core - Entity Types
//!
//! Data structures, the lifecycle table, the error taxonomy and configuration
//! shared by every other crate. No I/O and no async lives here.

mod config;
mod entities;
mod enums;
mod error;
mod identity;
pub mod lifecycle;
mod notification;

pub use config::{
    AutoCloseConfig, ChannelsConfig, ClassifierConfig, DesklineConfig, DispatcherConfig,
    EmailConfig, EngineConfig, RetryPolicy, ServerConfig, WebhookConfig,
};
pub use entities::{
    Actor, Agent, NewTicket, Ticket, TicketEvent, MAX_BODY_BYTES, MAX_SUBJECT_CHARS,
};
pub use enums::{EntityType, Priority, PriorityParseError, TicketStatus, TicketStatusParseError};
pub use error::{
    AssignmentError, ConfigError, DeliveryError, DesklineError, DesklineResult, DispatchError,
    StorageError, TransitionError, ValidationError,
};
pub use identity::{
    AgentId, EntityIdParseError, EntityIdType, LetterId, TicketId, Timestamp, VersionToken,
};
pub use lifecycle::{allowed_targets, is_allowed, validate_transition};
pub use notification::NotificationPayload;
