//! Enum types for Deskline entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CORE ENUMS
// ============================================================================

/// Entity type discriminator used in error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Ticket,
    TicketEvent,
    Agent,
    DeadLetter,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// TICKET STATUS
// ============================================================================

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Created, not yet picked up by anyone
    New,
    /// Owned by an agent and being worked on
    Open,
    /// Waiting on the requester
    Pending,
    /// Agent considers the request handled
    Resolved,
    /// Terminal; retained for audit only
    Closed,
    /// Requester disputed the resolution
    Reopened,
}

impl TicketStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [TicketStatus; 6] = [
        TicketStatus::New,
        TicketStatus::Open,
        TicketStatus::Pending,
        TicketStatus::Resolved,
        TicketStatus::Closed,
        TicketStatus::Reopened,
    ];

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TicketStatus::New => "New",
            TicketStatus::Open => "Open",
            TicketStatus::Pending => "Pending",
            TicketStatus::Resolved => "Resolved",
            TicketStatus::Closed => "Closed",
            TicketStatus::Reopened => "Reopened",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, TicketStatusParseError> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(TicketStatus::New),
            "open" => Ok(TicketStatus::Open),
            "pending" => Ok(TicketStatus::Pending),
            "resolved" => Ok(TicketStatus::Resolved),
            "closed" => Ok(TicketStatus::Closed),
            "reopened" => Ok(TicketStatus::Reopened),
            _ => Err(TicketStatusParseError(s.to_string())),
        }
    }

    /// Closed has no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Closed)
    }

    /// Whether a ticket in this status counts toward its owner's open load.
    pub fn counts_toward_load(&self) -> bool {
        matches!(
            self,
            TicketStatus::Open | TicketStatus::Pending | TicketStatus::Reopened
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for TicketStatus {
    type Err = TicketStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid ticket status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketStatusParseError(pub String);

impl fmt::Display for TicketStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid ticket status: {}", self.0)
    }
}

impl std::error::Error for TicketStatusParseError {}

// ============================================================================
// PRIORITY
// ============================================================================

/// Ticket priority. Ordered from least to most urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Normal => "Normal",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, PriorityParseError> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(PriorityParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for Priority {
    type Err = PriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid priority string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityParseError(pub String);

impl fmt::Display for PriorityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid priority: {}", self.0)
    }
}

impl std::error::Error for PriorityParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_db_str_roundtrip() {
        for status in TicketStatus::ALL {
            assert_eq!(TicketStatus::from_db_str(status.as_db_str()), Ok(status));
        }
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!("RESOLVED".parse::<TicketStatus>(), Ok(TicketStatus::Resolved));
        assert_eq!(" open ".parse::<TicketStatus>(), Ok(TicketStatus::Open));
    }

    #[test]
    fn test_status_parse_error_message() {
        let err = "archived".parse::<TicketStatus>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid ticket status: archived");
    }

    #[test]
    fn test_only_closed_is_terminal() {
        let terminal: Vec<_> = TicketStatus::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![&TicketStatus::Closed]);
    }

    #[test]
    fn test_load_counting_statuses() {
        assert!(TicketStatus::Open.counts_toward_load());
        assert!(TicketStatus::Pending.counts_toward_load());
        assert!(TicketStatus::Reopened.counts_toward_load());
        assert!(!TicketStatus::New.counts_toward_load());
        assert!(!TicketStatus::Resolved.counts_toward_load());
        assert!(!TicketStatus::Closed.counts_toward_load());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&TicketStatus::Reopened).unwrap(),
            "\"reopened\""
        );
        assert_eq!(serde_json::to_string(&Priority::Urgent).unwrap(), "\"urgent\"");
    }
}
