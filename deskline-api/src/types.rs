//! Request and response bodies.
//!
//! Ticket creation accepts [`NewTicket`](deskline_core::NewTicket) directly;
//! tickets, events, agents and dead letters are returned in their core shape.

use deskline_core::{Actor, Ticket, TicketStatus};
use deskline_notify::DispatcherSnapshot;
use serde::{Deserialize, Serialize};

/// Default page size for ticket listings.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Largest page a client may request.
pub const MAX_LIST_LIMIT: usize = 200;

/// Body of `POST /tickets/{id}/transitions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionBody {
    pub target: TicketStatus,
    /// Omitted means the request has no attributed initiator
    #[serde(default)]
    pub actor: Option<Actor>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Query of `GET /tickets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTicketsQuery {
    pub status: TicketStatus,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketListResponse {
    pub tickets: Vec<Ticket>,
    /// Pass back as `cursor` to fetch the next page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Body of `POST /agents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAgentRequest {
    pub name: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub agents: usize,
    pub dispatcher: DispatcherSnapshot,
}
