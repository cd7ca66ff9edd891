//! In-memory ticket store backed by a sharded concurrent map.

use crate::{listing_order, CommittedEvent, EventAppend, PageCursor, TicketPage, TicketStore};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use deskline_core::{
    lifecycle, AgentId, DesklineResult, EntityType, NewTicket, StorageError, Ticket, TicketEvent,
    TicketId, TicketStatus,
};
use std::collections::HashMap;

/// A ticket together with its append-only history.
#[derive(Debug, Clone)]
struct TicketRecord {
    ticket: Ticket,
    events: Vec<TicketEvent>,
}

/// In-memory [`TicketStore`].
///
/// Each ticket lives in one map shard; the version check, event append and
/// ticket update for a ticket all happen under that shard's write guard, so
/// readers never see one without the other. Tickets on different shards never
/// contend.
#[derive(Debug, Default)]
pub struct InMemoryTicketStore {
    tickets: DashMap<TicketId, TicketRecord>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tickets.
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Insert a fully-formed ticket, bypassing validation.
    ///
    /// Used to seed fixtures with specific statuses and timestamps.
    pub fn insert_raw(&self, ticket: Ticket) -> DesklineResult<()> {
        match self.tickets.entry(ticket.ticket_id) {
            Entry::Occupied(_) => Err(StorageError::InsertFailed {
                entity_type: EntityType::Ticket,
                reason: format!("ticket {} already exists", ticket.ticket_id),
            }
            .into()),
            Entry::Vacant(slot) => {
                slot.insert(TicketRecord {
                    ticket,
                    events: Vec::new(),
                });
                Ok(())
            }
        }
    }
}

impl TicketStore for InMemoryTicketStore {
    fn create(&self, input: NewTicket) -> DesklineResult<Ticket> {
        input.validate()?;
        let ticket = Ticket::from_new(input);
        self.insert_raw(ticket.clone())?;
        tracing::debug!(ticket_id = %ticket.ticket_id, priority = %ticket.priority, "Ticket created");
        Ok(ticket)
    }

    fn get(&self, id: TicketId) -> DesklineResult<Ticket> {
        self.tickets
            .get(&id)
            .map(|record| record.ticket.clone())
            .ok_or_else(|| StorageError::ticket_not_found(id).into())
    }

    fn append_event(&self, append: EventAppend) -> DesklineResult<CommittedEvent> {
        let mut record = self
            .tickets
            .get_mut(&append.ticket_id)
            .ok_or_else(|| StorageError::ticket_not_found(append.ticket_id))?;

        let current = record.ticket.version;
        if current != append.expected_version {
            return Err(StorageError::Conflict {
                ticket_id: append.ticket_id,
                expected: append.expected_version,
                actual: current,
            }
            .into());
        }
        lifecycle::validate_transition(
            append.ticket_id,
            record.ticket.status,
            append.new_status,
        )?;

        let before = record.ticket.clone();
        // Clock skew must not move updated_at backwards.
        let now = Utc::now().max(before.updated_at);
        let event = TicketEvent {
            ticket_id: append.ticket_id,
            sequence: record.events.len() as u64 + 1,
            prior_status: before.status,
            new_status: append.new_status,
            actor: append.actor,
            owner: append.owner,
            note: append.note,
            occurred_at: now,
        };

        record.ticket.status = append.new_status;
        record.ticket.owner = append.owner;
        record.ticket.version = current.next();
        record.ticket.updated_at = now;
        record.events.push(event.clone());

        Ok(CommittedEvent {
            before,
            ticket: record.ticket.clone(),
            event,
        })
    }

    fn list_page(
        &self,
        status: TicketStatus,
        after: Option<PageCursor>,
        limit: usize,
    ) -> DesklineResult<TicketPage> {
        let mut matching: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|entry| entry.ticket.status == status)
            .filter(|entry| after.map_or(true, |cursor| cursor.precedes(&entry.ticket)))
            .map(|entry| entry.ticket.clone())
            .collect();
        matching.sort_by(listing_order);

        let has_more = matching.len() > limit;
        matching.truncate(limit);
        let next = if has_more {
            matching.last().map(PageCursor::of)
        } else {
            None
        };

        Ok(TicketPage {
            tickets: matching,
            next,
        })
    }

    fn events(&self, id: TicketId) -> DesklineResult<Vec<TicketEvent>> {
        self.tickets
            .get(&id)
            .map(|record| record.events.clone())
            .ok_or_else(|| StorageError::ticket_not_found(id).into())
    }

    fn count_owned_active(&self, agent: AgentId) -> DesklineResult<usize> {
        Ok(self
            .tickets
            .iter()
            .filter(|entry| {
                entry.ticket.owner == Some(agent) && entry.ticket.counts_toward_load()
            })
            .count())
    }

    fn owned_load_counts(&self) -> DesklineResult<HashMap<AgentId, usize>> {
        let mut loads = HashMap::new();
        for entry in self.tickets.iter() {
            if !entry.ticket.counts_toward_load() {
                continue;
            }
            if let Some(owner) = entry.ticket.owner {
                *loads.entry(owner).or_insert(0) += 1;
            }
        }
        Ok(loads)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_core::{
        Actor, DesklineError, EntityIdType, Priority, TransitionError, ValidationError,
        VersionToken,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn open_append(ticket: &Ticket, owner: AgentId) -> EventAppend {
        EventAppend {
            ticket_id: ticket.ticket_id,
            expected_version: ticket.version,
            new_status: TicketStatus::Open,
            owner: Some(owner),
            actor: Actor::Unattributed,
            note: None,
        }
    }

    #[test]
    fn test_create_starts_new_and_unowned() {
        let store = InMemoryTicketStore::new();
        let ticket = store
            .create(NewTicket::new("Printer down", "Paper jam", Priority::High))
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::New);
        assert!(ticket.owner.is_none());
        assert_eq!(store.get(ticket.ticket_id).unwrap(), ticket);
        assert!(store.events(ticket.ticket_id).unwrap().is_empty());
    }

    #[test]
    fn test_create_rejects_invalid_input() {
        let store = InMemoryTicketStore::new();
        let err = store
            .create(NewTicket::new("", "body", Priority::Low))
            .unwrap_err();
        assert!(matches!(
            err,
            DesklineError::Validation(ValidationError::RequiredFieldMissing { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let store = InMemoryTicketStore::new();
        assert!(store.get(TicketId::now_v7()).unwrap_err().is_not_found());
        assert!(store.events(TicketId::now_v7()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_append_updates_ticket_and_history_together() {
        let store = InMemoryTicketStore::new();
        let ticket = store
            .create(NewTicket::new("VPN", "", Priority::Normal))
            .unwrap();
        let agent = AgentId::now_v7();

        let committed = store.append_event(open_append(&ticket, agent)).unwrap();
        assert_eq!(committed.before, ticket);
        assert_eq!(committed.ticket.status, TicketStatus::Open);
        assert_eq!(committed.ticket.owner, Some(agent));
        assert_eq!(committed.ticket.version, VersionToken::new(2));
        assert_eq!(committed.event.sequence, 1);
        assert_eq!(committed.event.prior_status, TicketStatus::New);

        let stored = store.get(ticket.ticket_id).unwrap();
        assert_eq!(stored, committed.ticket);
        assert_eq!(store.events(ticket.ticket_id).unwrap(), vec![committed.event]);
    }

    #[test]
    fn test_stale_version_conflicts_and_writes_nothing() {
        let store = InMemoryTicketStore::new();
        let ticket = store
            .create(NewTicket::new("VPN", "", Priority::Normal))
            .unwrap();
        let agent = AgentId::now_v7();
        store.append_event(open_append(&ticket, agent)).unwrap();

        let mut stale = open_append(&ticket, agent);
        stale.new_status = TicketStatus::Pending;
        let err = store.append_event(stale).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.events(ticket.ticket_id).unwrap().len(), 1);
        assert_eq!(store.get(ticket.ticket_id).unwrap().status, TicketStatus::Open);
    }

    #[test]
    fn test_unlisted_transition_is_refused() {
        let store = InMemoryTicketStore::new();
        let ticket = store
            .create(NewTicket::new("VPN", "", Priority::Normal))
            .unwrap();
        let mut append = open_append(&ticket, AgentId::now_v7());
        append.new_status = TicketStatus::Resolved;
        let err = store.append_event(append).unwrap_err();
        assert!(matches!(
            err,
            DesklineError::Transition(TransitionError::InvalidTransition { .. })
        ));
        assert_eq!(store.get(ticket.ticket_id).unwrap().version, VersionToken::INITIAL);
    }

    #[test]
    fn test_list_page_orders_and_pages() {
        let store = InMemoryTicketStore::new();
        for i in 0..5 {
            store
                .create(NewTicket::new(format!("t{}", i), "", Priority::Low))
                .unwrap();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let first = store.list_page(TicketStatus::New, None, 2).unwrap();
        assert_eq!(first.tickets.len(), 2);
        assert_eq!(first.tickets[0].subject, "t4");
        assert_eq!(first.tickets[1].subject, "t3");
        let cursor = first.next.unwrap();

        let second = store.list_page(TicketStatus::New, Some(cursor), 2).unwrap();
        assert_eq!(second.tickets[0].subject, "t2");
        let third = store
            .list_page(TicketStatus::New, second.next, 2)
            .unwrap();
        assert_eq!(third.tickets.len(), 1);
        assert_eq!(third.tickets[0].subject, "t0");
        assert!(third.next.is_none());

        assert!(store
            .list_page(TicketStatus::Closed, None, 10)
            .unwrap()
            .tickets
            .is_empty());
    }

    #[test]
    fn test_load_counts_follow_status() {
        let store = InMemoryTicketStore::new();
        let agent = AgentId::now_v7();
        let a = store.create(NewTicket::new("a", "", Priority::Low)).unwrap();
        let b = store.create(NewTicket::new("b", "", Priority::Low)).unwrap();
        let a = store.append_event(open_append(&a, agent)).unwrap().ticket;
        store.append_event(open_append(&b, agent)).unwrap();
        assert_eq!(store.count_owned_active(agent).unwrap(), 2);

        store
            .append_event(EventAppend {
                ticket_id: a.ticket_id,
                expected_version: a.version,
                new_status: TicketStatus::Resolved,
                owner: Some(agent),
                actor: Actor::Agent(agent),
                note: Some("fixed".to_string()),
            })
            .unwrap();
        assert_eq!(store.count_owned_active(agent).unwrap(), 1);
        assert_eq!(store.owned_load_counts().unwrap().get(&agent), Some(&1));
    }

    #[test]
    fn test_concurrent_appends_with_same_token_commit_once() {
        let store = Arc::new(InMemoryTicketStore::new());
        let ticket = store
            .create(NewTicket::new("race", "", Priority::Urgent))
            .unwrap();
        let wins = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|s| {
            for _ in 0..8 {
                let store = Arc::clone(&store);
                let wins = Arc::clone(&wins);
                let ticket = ticket.clone();
                s.spawn(move || {
                    if store
                        .append_event(open_append(&ticket, AgentId::now_v7()))
                        .is_ok()
                    {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(store.events(ticket.ticket_id).unwrap().len(), 1);
        assert_eq!(store.get(ticket.ticket_id).unwrap().version, VersionToken::new(2));
    }
}
