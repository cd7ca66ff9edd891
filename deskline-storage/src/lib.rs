//! Deskline Storage - Ticket Store Trait and In-Memory Implementation
//!
//! The store exclusively owns tickets and their events. Every status or owner
//! change goes through [`TicketStore::append_event`], which checks the
//! caller's version token and commits the event and the ticket update as one
//! unit.

mod memory;
mod scan;

pub use memory::InMemoryTicketStore;
pub use scan::{list_by_status, TicketScan, DEFAULT_SCAN_PAGE_SIZE};

use chrono::DateTime;
use deskline_core::{
    Actor, AgentId, DesklineResult, NewTicket, Ticket, TicketEvent, TicketId,
    TicketStatus, Timestamp, ValidationError, VersionToken,
};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// COMMIT TYPES
// ============================================================================

/// A transition the caller wants committed.
///
/// The store assigns the sequence number and timestamp; the caller supplies
/// the version token it read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAppend {
    pub ticket_id: TicketId,
    pub expected_version: VersionToken,
    pub new_status: TicketStatus,
    /// Owner in effect after the transition
    pub owner: Option<AgentId>,
    pub actor: Actor,
    pub note: Option<String>,
}

/// Result of a successful append: the ticket as committed and its new event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedEvent {
    /// Ticket state before the commit
    pub before: Ticket,
    pub ticket: Ticket,
    pub event: TicketEvent,
}

// ============================================================================
// PAGING
// ============================================================================

/// Position in an `updated_at DESC, ticket_id DESC` listing.
///
/// Rendered as `<unix nanos>.<ticket uuid>` so it can travel in a query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageCursor {
    pub updated_at: Timestamp,
    pub ticket_id: TicketId,
}

impl PageCursor {
    pub fn of(ticket: &Ticket) -> Self {
        Self {
            updated_at: ticket.updated_at,
            ticket_id: ticket.ticket_id,
        }
    }

    /// Whether `ticket` sorts strictly after this cursor.
    pub fn precedes(&self, ticket: &Ticket) -> bool {
        (ticket.updated_at, ticket.ticket_id) < (self.updated_at, self.ticket_id)
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.updated_at.timestamp_nanos_opt().unwrap_or(i64::MAX);
        write!(f, "{}.{}", nanos, self.ticket_id)
    }
}

impl FromStr for PageCursor {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidValue {
            field: "cursor".to_string(),
            reason: reason.to_string(),
        };
        let (nanos, id) = s.split_once('.').ok_or_else(|| invalid("missing separator"))?;
        let nanos: i64 = nanos.parse().map_err(|_| invalid("bad timestamp"))?;
        let ticket_id: TicketId = id.parse().map_err(|_| invalid("bad ticket id"))?;
        Ok(Self {
            updated_at: DateTime::from_timestamp_nanos(nanos),
            ticket_id,
        })
    }
}

/// One page of a status listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketPage {
    pub tickets: Vec<Ticket>,
    /// Cursor for the following page; None when this page is the last
    pub next: Option<PageCursor>,
}

/// Sort key for status listings, most recently updated first.
pub(crate) fn listing_order(a: &Ticket, b: &Ticket) -> std::cmp::Ordering {
    (b.updated_at, b.ticket_id).cmp(&(a.updated_at, a.ticket_id))
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Durable record of tickets and their audit history.
pub trait TicketStore: Send + Sync {
    /// Validate the input and store a new ticket in status New with no owner.
    fn create(&self, input: NewTicket) -> DesklineResult<Ticket>;

    /// Fetch a ticket with its current version token.
    fn get(&self, id: TicketId) -> DesklineResult<Ticket>;

    /// Append one event and apply its status/owner change atomically.
    ///
    /// Fails with `Conflict` when `expected_version` is stale; nothing is
    /// written in that case.
    fn append_event(&self, append: EventAppend) -> DesklineResult<CommittedEvent>;

    /// Tickets in `status` after `after`, most recently updated first.
    fn list_page(
        &self,
        status: TicketStatus,
        after: Option<PageCursor>,
        limit: usize,
    ) -> DesklineResult<TicketPage>;

    /// Full event history of a ticket in sequence order.
    fn events(&self, id: TicketId) -> DesklineResult<Vec<TicketEvent>>;

    /// Number of tickets owned by `agent` whose status counts toward load.
    fn count_owned_active(&self, agent: AgentId) -> DesklineResult<usize>;

    /// Load per agent for every agent that owns at least one active ticket.
    fn owned_load_counts(&self) -> DesklineResult<HashMap<AgentId, usize>>;
}
