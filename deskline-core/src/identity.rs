//! Identity types for Deskline entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Common behaviour of strongly-typed entity identifiers.
///
/// Every identifier wraps a UUIDv7, so identifiers sort by creation time.
pub trait EntityIdType:
    Copy + Eq + Ord + std::hash::Hash + fmt::Display + fmt::Debug + Send + Sync + 'static
{
    /// Short name of the entity this id refers to ("ticket", "agent", ...).
    const ENTITY_NAME: &'static str;

    /// Wrap an existing UUID.
    fn new(uuid: Uuid) -> Self;

    /// Access the underlying UUID.
    fn as_uuid(&self) -> Uuid;

    /// Generate a new timestamp-sortable id.
    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// The all-zero id, used as a placeholder in tests.
    fn nil() -> Self {
        Self::new(Uuid::nil())
    }
}

/// Error when parsing an identifier from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityIdParseError {
    pub entity: &'static str,
    pub input: String,
}

impl fmt::Display for EntityIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {} id: {}", self.entity, self.input)
    }
}

impl std::error::Error for EntityIdParseError {}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident, $entity:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $entity;

            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = EntityIdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| EntityIdParseError {
                        entity: $entity,
                        input: s.to_string(),
                    })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_entity_id!(
    /// Identifier of a support ticket.
    TicketId,
    "ticket"
);

define_entity_id!(
    /// Identifier of a support agent.
    AgentId,
    "agent"
);

define_entity_id!(
    /// Identifier of a dead-letter record.
    LetterId,
    "dead letter"
);

// ============================================================================
// VERSION TOKEN
// ============================================================================

/// Optimistic concurrency token for a ticket.
///
/// Starts at 1 when the ticket is created and increases by exactly one on
/// every committed mutation. Callers treat it as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(u64);

impl VersionToken {
    /// Version assigned to a freshly created ticket.
    pub const INITIAL: VersionToken = VersionToken(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The token that follows this one after a committed mutation.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_id_roundtrip_through_string() {
        let id = TicketId::now_v7();
        let parsed: TicketId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_agent_id_parse_rejects_garbage() {
        let err = "not-a-uuid".parse::<AgentId>().unwrap_err();
        assert_eq!(err.entity, "agent");
        assert!(err.to_string().contains("not-a-uuid"));
    }

    #[test]
    fn test_ids_sort_by_creation() {
        let first = TicketId::now_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = TicketId::now_v7();
        assert!(first < second);
    }

    #[test]
    fn test_version_token_next() {
        let v = VersionToken::INITIAL;
        assert_eq!(v.value(), 1);
        assert_eq!(v.next().value(), 2);
        assert!(v.next() > v);
        assert_eq!(v.to_string(), "v1");
    }

    #[test]
    fn test_id_serializes_as_plain_uuid() {
        let id = AgentId::nil();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
    }
}
