//! Notification payload handed to the dispatcher.
//!
//! Built once from the committed event plus a snapshot of the ticket and
//! never mutated afterwards; every channel renders from the same value.

use crate::{
    Actor, AgentId, Priority, Ticket, TicketEvent, TicketId, TicketStatus, Timestamp,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable description of a transition, as seen by delivery channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Unique per payload; channels use it as an idempotency key
    pub delivery_id: Uuid,
    pub ticket_id: TicketId,
    pub sequence: u64,
    pub subject: String,
    pub priority: Priority,
    pub requester: Option<String>,
    pub prior_status: TicketStatus,
    pub new_status: TicketStatus,
    pub owner: Option<AgentId>,
    pub actor: Actor,
    pub note: Option<String>,
    pub occurred_at: Timestamp,
}

impl NotificationPayload {
    /// Build the payload for `event`, using `ticket` as committed with it.
    pub fn from_event(ticket: &Ticket, event: &TicketEvent) -> Self {
        Self {
            delivery_id: Uuid::now_v7(),
            ticket_id: event.ticket_id,
            sequence: event.sequence,
            subject: ticket.subject.clone(),
            priority: ticket.priority,
            requester: ticket.requester.clone(),
            prior_status: event.prior_status,
            new_status: event.new_status,
            owner: event.owner,
            actor: event.actor.clone(),
            note: event.note.clone(),
            occurred_at: event.occurred_at,
        }
    }

    /// Machine-readable event name, e.g. `ticket.resolved`.
    pub fn event_type(&self) -> String {
        format!("ticket.{}", self.new_status.as_db_str().to_lowercase())
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} ({} -> {})",
            self.priority, self.subject, self.prior_status, self.new_status
        )
    }
}
