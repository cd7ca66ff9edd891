//! Deskline Test Utilities
//!
//! Shared test infrastructure for the Deskline workspace:
//! - Mock delivery channels and a store wrapper that injects conflicts
//! - Proptest generators for entity types and lifecycle pairs
//! - Fixtures for seeding tickets and agents
//! - Assertions for Deskline error variants

pub use deskline_storage::InMemoryTicketStore;

pub use deskline_core::{
    lifecycle, Actor, Agent, AgentId, AssignmentError, DeliveryError, DesklineError,
    DesklineResult, EntityIdType, NewTicket, NotificationPayload, Priority, StorageError, Ticket,
    TicketEvent, TicketId, TicketStatus, Timestamp, TransitionError, VersionToken,
};

use async_trait::async_trait;
use deskline_notify::NotificationChannel;
use deskline_storage::{CommittedEvent, EventAppend, PageCursor, TicketPage, TicketStore};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// MOCK CHANNELS
// ============================================================================

/// Channel that records every payload it is asked to send.
///
/// Scripted outcomes are consumed one per call; once the script runs out
/// every call succeeds.
#[derive(Debug)]
pub struct RecordingChannel {
    name: String,
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    sent: Mutex<Vec<NotificationPayload>>,
    calls: AtomicUsize,
}

impl RecordingChannel {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::scripted(name, Vec::new())
    }

    pub fn scripted(
        name: impl Into<String>,
        script: Vec<Result<(), DeliveryError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Channel whose first `failures` calls fail with a retryable error.
    pub fn failing(name: impl Into<String>, failures: usize) -> Arc<Self> {
        let name = name.into();
        let script = (0..failures)
            .map(|i| {
                Err(DeliveryError::retryable(
                    name.clone(),
                    format!("attempt {} refused", i + 1),
                ))
            })
            .collect();
        Self::scripted(name, script)
    }

    /// Payloads delivered successfully, in call order.
    pub fn sent(&self) -> Vec<NotificationPayload> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn as_channel(self: &Arc<Self>) -> Arc<dyn NotificationChannel> {
        self.clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(Ok(()));
        if outcome.is_ok() {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(payload.clone());
            }
        }
        outcome
    }
}

// ============================================================================
// MOCK STORES
// ============================================================================

/// Store wrapper whose next `append_event` calls fail with `Conflict`
/// without writing, as if another writer had committed first.
pub struct ConflictingStore {
    inner: Arc<InMemoryTicketStore>,
    conflicts_remaining: AtomicUsize,
    appends_seen: AtomicUsize,
}

impl ConflictingStore {
    pub fn new(inner: Arc<InMemoryTicketStore>, conflicts: usize) -> Self {
        Self {
            inner,
            conflicts_remaining: AtomicUsize::new(conflicts),
            appends_seen: AtomicUsize::new(0),
        }
    }

    /// Number of append attempts, successful or not.
    pub fn appends_seen(&self) -> usize {
        self.appends_seen.load(Ordering::SeqCst)
    }
}

impl TicketStore for ConflictingStore {
    fn create(&self, input: NewTicket) -> DesklineResult<Ticket> {
        self.inner.create(input)
    }

    fn get(&self, id: TicketId) -> DesklineResult<Ticket> {
        self.inner.get(id)
    }

    fn append_event(&self, append: EventAppend) -> DesklineResult<CommittedEvent> {
        self.appends_seen.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .conflicts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Conflict {
                ticket_id: append.ticket_id,
                expected: append.expected_version,
                actual: append.expected_version.next(),
            }
            .into());
        }
        self.inner.append_event(append)
    }

    fn list_page(
        &self,
        status: TicketStatus,
        after: Option<PageCursor>,
        limit: usize,
    ) -> DesklineResult<TicketPage> {
        self.inner.list_page(status, after, limit)
    }

    fn events(&self, id: TicketId) -> DesklineResult<Vec<TicketEvent>> {
        self.inner.events(id)
    }

    fn count_owned_active(&self, agent: AgentId) -> DesklineResult<usize> {
        self.inner.count_owned_active(agent)
    }

    fn owned_load_counts(&self) -> DesklineResult<HashMap<AgentId, usize>> {
        self.inner.owned_load_counts()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Deskline types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    pub fn arb_ticket_id() -> impl Strategy<Value = TicketId> {
        any::<u128>().prop_map(|n| TicketId::new(Uuid::from_u128(n)))
    }

    pub fn arb_agent_id() -> impl Strategy<Value = AgentId> {
        any::<u128>().prop_map(|n| AgentId::new(Uuid::from_u128(n)))
    }

    pub fn arb_status() -> impl Strategy<Value = TicketStatus> {
        prop::sample::select(TicketStatus::ALL.to_vec())
    }

    pub fn arb_priority() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::Low),
            Just(Priority::Normal),
            Just(Priority::High),
            Just(Priority::Urgent),
        ]
    }

    /// Valid ticket input.
    pub fn arb_new_ticket() -> impl Strategy<Value = NewTicket> {
        (
            "[A-Za-z][A-Za-z0-9 ]{0,59}",
            "[A-Za-z0-9 .,]{0,200}",
            arb_priority(),
            proptest::option::of("[a-z]{3,10}"),
        )
            .prop_map(|(subject, body, priority, category)| NewTicket {
                subject,
                body,
                priority,
                category,
                requester: None,
            })
    }

    /// A `(from, to)` pair listed in the lifecycle table.
    pub fn arb_valid_transition() -> impl Strategy<Value = (TicketStatus, TicketStatus)> {
        prop::sample::select(lifecycle::all_transitions().collect::<Vec<_>>())
    }

    /// A `(from, to)` pair the lifecycle table does not list.
    pub fn arb_invalid_transition() -> impl Strategy<Value = (TicketStatus, TicketStatus)> {
        let invalid: Vec<_> = TicketStatus::ALL
            .into_iter()
            .flat_map(|from| TicketStatus::ALL.into_iter().map(move |to| (from, to)))
            .filter(|(from, to)| !lifecycle::is_allowed(*from, *to))
            .collect();
        prop::sample::select(invalid)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built data for common scenarios.

    use super::*;
    use chrono::Utc;

    /// The "Printer down" ticket input.
    pub fn printer_down() -> NewTicket {
        NewTicket::new("Printer down", "Third floor printer shows error E42", Priority::High)
            .with_requester("sam@example.com")
    }

    /// Insert a ticket directly in `status` with `owner`, bypassing the
    /// lifecycle. Tickets in New get no owner regardless of `owner`.
    pub fn seed_ticket(
        store: &InMemoryTicketStore,
        status: TicketStatus,
        owner: Option<AgentId>,
    ) -> Ticket {
        let mut ticket = Ticket::from_new(NewTicket::new(
            format!("Seeded {}", status),
            "seeded",
            Priority::Normal,
        ));
        ticket.status = status;
        ticket.owner = if status == TicketStatus::New { None } else { owner };
        // `insert_raw` only fails on an id collision, which fresh v7 ids rule out.
        let _ = store.insert_raw(ticket.clone());
        ticket
    }

    /// Seed a Resolved ticket whose last update lies `age` in the past.
    pub fn seed_resolved_aged(
        store: &InMemoryTicketStore,
        owner: AgentId,
        age: Duration,
    ) -> Ticket {
        let mut ticket = Ticket::from_new(NewTicket::new("Resolved long ago", "", Priority::Low));
        ticket.status = TicketStatus::Resolved;
        ticket.owner = Some(owner);
        let age = chrono::Duration::from_std(age).unwrap_or(chrono::Duration::zero());
        ticket.updated_at = Utc::now() - age;
        ticket.created_at = ticket.updated_at;
        let _ = store.insert_raw(ticket.clone());
        ticket
    }

    /// An active agent with the given skills.
    pub fn agent(name: &str, skills: &[&str]) -> Agent {
        Agent::new(name, skills.iter().copied())
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Deskline error variants.

    use super::*;

    #[track_caller]
    pub fn assert_invalid_transition<T: std::fmt::Debug>(
        result: &DesklineResult<T>,
        from: TicketStatus,
        to: TicketStatus,
    ) {
        match result {
            Err(DesklineError::Transition(TransitionError::InvalidTransition {
                from: f,
                to: t,
                ..
            })) if *f == from && *t == to => {}
            other => panic!(
                "Expected InvalidTransition {} -> {}, got: {:?}",
                from, to, other
            ),
        }
    }

    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &DesklineResult<T>) {
        match result {
            Err(e) if e.is_conflict() => {}
            other => panic!("Expected Conflict, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_no_eligible_agent<T: std::fmt::Debug>(result: &DesklineResult<T>) {
        match result {
            Err(DesklineError::Assignment(AssignmentError::NoEligibleAgent { .. })) => {}
            other => panic!("Expected NoEligibleAgent, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &DesklineResult<T>) {
        match result {
            Err(e) if e.is_not_found() => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }
}
