//! Entity types for the ticket engine

use crate::{
    AgentId, EntityIdType, Priority, TicketId, TicketStatus, Timestamp, ValidationError,
    VersionToken,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Maximum subject length, in characters.
pub const MAX_SUBJECT_CHARS: usize = 200;

/// Maximum body length, in bytes.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

// ============================================================================
// ACTOR
// ============================================================================

/// Who initiated a transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// Automation such as the auto-close scheduler
    System,
    /// A registered agent
    Agent(AgentId),
    /// The person who raised the ticket, by contact address
    Requester(String),
    /// No initiator was supplied
    Unattributed,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => write!(f, "system"),
            Actor::Agent(id) => write!(f, "agent:{}", id),
            Actor::Requester(contact) => write!(f, "requester:{}", contact),
            Actor::Unattributed => write!(f, "unattributed"),
        }
    }
}

// ============================================================================
// TICKET
// ============================================================================

/// Input for creating a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub priority: Priority,
    /// Free-form category fed to the classifier
    #[serde(default)]
    pub category: Option<String>,
    /// Contact address of the requester
    #[serde(default)]
    pub requester: Option<String>,
}

impl NewTicket {
    pub fn new(subject: impl Into<String>, body: impl Into<String>, priority: Priority) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            priority,
            category: None,
            requester: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    /// Check field limits before the ticket is stored.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.subject.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "subject".to_string(),
            });
        }
        let subject_chars = self.subject.chars().count();
        if subject_chars > MAX_SUBJECT_CHARS {
            return Err(ValidationError::InvalidValue {
                field: "subject".to_string(),
                reason: format!(
                    "{} characters exceeds the limit of {}",
                    subject_chars, MAX_SUBJECT_CHARS
                ),
            });
        }
        if self.body.len() > MAX_BODY_BYTES {
            return Err(ValidationError::InvalidValue {
                field: "body".to_string(),
                reason: format!(
                    "{} bytes exceeds the limit of {}",
                    self.body.len(),
                    MAX_BODY_BYTES
                ),
            });
        }
        Ok(())
    }
}

/// A trackable support request.
///
/// `status` and `owner` only change through the transition engine; the store
/// bumps `version` on every committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: TicketId,
    pub subject: String,
    pub body: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub category: Option<String>,
    pub requester: Option<String>,
    /// Weak reference to the owning agent; None only while New
    /// (or when closed directly from New)
    pub owner: Option<AgentId>,
    pub version: VersionToken,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Ticket {
    /// Build a fresh ticket in status New from validated input.
    pub fn from_new(input: NewTicket) -> Self {
        let now = Utc::now();
        Self {
            ticket_id: TicketId::now_v7(),
            subject: input.subject.trim().to_string(),
            body: input.body,
            status: TicketStatus::New,
            priority: input.priority,
            category: input.category,
            requester: input.requester,
            owner: None,
            version: VersionToken::INITIAL,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this ticket contributes to its owner's open load.
    pub fn counts_toward_load(&self) -> bool {
        self.owner.is_some() && self.status.counts_toward_load()
    }
}

// ============================================================================
// TICKET EVENT
// ============================================================================

/// Immutable audit record of one committed transition.
///
/// Events for a ticket are numbered 1, 2, 3, ... without gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketEvent {
    pub ticket_id: TicketId,
    pub sequence: u64,
    pub prior_status: TicketStatus,
    pub new_status: TicketStatus,
    pub actor: Actor,
    /// Owner in effect after the transition
    pub owner: Option<AgentId>,
    pub note: Option<String>,
    pub occurred_at: Timestamp,
}

// ============================================================================
// AGENT
// ============================================================================

/// A support agent who can own tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub name: String,
    /// Skill tags matched against a ticket's required tags
    pub skills: BTreeSet<String>,
    /// Inactive agents keep their tickets but receive no new ones
    pub active: bool,
    pub created_at: Timestamp,
}

impl Agent {
    /// Create a new, active agent.
    pub fn new<I, S>(name: impl Into<String>, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            agent_id: AgentId::now_v7(),
            name: name.into(),
            skills: skills
                .into_iter()
                .map(|s| s.into().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Use a fixed id instead of a generated one.
    pub fn with_id(mut self, agent_id: AgentId) -> Self {
        self.agent_id = agent_id;
        self
    }

    /// Whether any of the agent's skills appear in `tags`.
    pub fn matches_any(&self, tags: &BTreeSet<String>) -> bool {
        self.skills.iter().any(|s| tags.contains(s))
    }
}
