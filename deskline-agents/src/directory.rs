//! Agent registry with cached per-agent load counters.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use deskline_core::{Agent, AgentId, AssignmentError, DesklineResult, Ticket};
use deskline_storage::TicketStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
struct AgentEntry {
    agent: Agent,
    /// Open-ticket count; only ever touched with atomic ops
    load: AtomicUsize,
}

/// An agent together with its cached load, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLoad {
    #[serde(flatten)]
    pub agent: Agent,
    pub load: usize,
}

/// Registry of agents keyed by id.
///
/// Load counters are a cache of what the ticket store would report; the
/// engine keeps them current through [`adjust_load`](Self::adjust_load) and
/// [`rebuild_loads`](Self::rebuild_loads) resynchronises them. Changing one
/// agent's counter never blocks another's.
#[derive(Debug, Default)]
pub struct AgentDirectory {
    agents: DashMap<AgentId, AgentEntry>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent with a zero load.
    pub fn register(&self, agent: Agent) -> Result<Agent, AssignmentError> {
        match self.agents.entry(agent.agent_id) {
            Entry::Occupied(_) => Err(AssignmentError::AlreadyRegistered {
                agent_id: agent.agent_id,
            }),
            Entry::Vacant(slot) => {
                tracing::info!(
                    agent_id = %agent.agent_id,
                    name = %agent.name,
                    skills = ?agent.skills,
                    "Agent registered"
                );
                slot.insert(AgentEntry {
                    agent: agent.clone(),
                    load: AtomicUsize::new(0),
                });
                Ok(agent)
            }
        }
    }

    /// Stop routing new tickets to an agent. Existing ownership is kept.
    pub fn deactivate(&self, id: AgentId) -> Result<(), AssignmentError> {
        self.set_active(id, false)
    }

    pub fn activate(&self, id: AgentId) -> Result<(), AssignmentError> {
        self.set_active(id, true)
    }

    fn set_active(&self, id: AgentId, active: bool) -> Result<(), AssignmentError> {
        let mut entry = self
            .agents
            .get_mut(&id)
            .ok_or(AssignmentError::AgentNotFound { agent_id: id })?;
        entry.agent.active = active;
        tracing::info!(agent_id = %id, active, "Agent availability changed");
        Ok(())
    }

    pub fn get(&self, id: AgentId) -> Option<Agent> {
        self.agents.get(&id).map(|entry| entry.agent.clone())
    }

    /// Whether `id` is registered and accepting new tickets.
    pub fn is_active(&self, id: AgentId) -> bool {
        self.agents
            .get(&id)
            .map(|entry| entry.agent.active)
            .unwrap_or(false)
    }

    /// Cached load for an agent; zero for unknown agents.
    pub fn load(&self, id: AgentId) -> usize {
        self.agents
            .get(&id)
            .map(|entry| entry.load.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn increment(&self, id: AgentId) {
        match self.agents.get(&id) {
            Some(entry) => {
                entry.load.fetch_add(1, Ordering::AcqRel);
            }
            None => tracing::debug!(agent_id = %id, "Load increment for unregistered agent"),
        }
    }

    /// Decrement, saturating at zero.
    pub fn decrement(&self, id: AgentId) {
        match self.agents.get(&id) {
            Some(entry) => {
                let _ = entry
                    .load
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
            }
            None => tracing::debug!(agent_id = %id, "Load decrement for unregistered agent"),
        }
    }

    /// Apply the counter change implied by a committed ticket update.
    pub fn adjust_load(&self, before: &Ticket, after: &Ticket) {
        let was = before.counts_toward_load().then_some(before.owner).flatten();
        let now = after.counts_toward_load().then_some(after.owner).flatten();
        if was == now {
            return;
        }
        if let Some(old) = was {
            self.decrement(old);
        }
        if let Some(new) = now {
            self.increment(new);
        }
    }

    /// Recompute every counter from the ticket store.
    ///
    /// Adjustments racing with a rebuild may be overwritten; the next rebuild
    /// corrects them.
    pub fn rebuild_loads(&self, store: &dyn TicketStore) -> DesklineResult<()> {
        let loads = store.owned_load_counts()?;
        for entry in self.agents.iter() {
            let load = loads.get(entry.key()).copied().unwrap_or(0);
            entry.load.store(load, Ordering::Release);
        }
        tracing::debug!(agents = self.agents.len(), "Agent loads rebuilt");
        Ok(())
    }

    /// Active agents with at least one skill in `tags` (all active agents
    /// when `tags` is empty), paired with their current load.
    pub fn candidates(&self, tags: &BTreeSet<String>) -> Vec<(AgentId, usize)> {
        self.agents
            .iter()
            .filter(|entry| entry.agent.active)
            .filter(|entry| tags.is_empty() || entry.agent.matches_any(tags))
            .map(|entry| (*entry.key(), entry.load.load(Ordering::Acquire)))
            .collect()
    }

    /// Every agent with its load, ordered by id.
    pub fn snapshot(&self) -> Vec<AgentLoad> {
        let mut all: Vec<AgentLoad> = self
            .agents
            .iter()
            .map(|entry| AgentLoad {
                agent: entry.agent.clone(),
                load: entry.load.load(Ordering::Acquire),
            })
            .collect();
        all.sort_by_key(|a| a.agent.agent_id);
        all
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_core::{
        Actor, EntityIdType, NewTicket, Priority, TicketStatus,
    };
    use deskline_storage::{EventAppend, InMemoryTicketStore};
    use std::sync::Arc;

    fn tags(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_register_twice_fails() {
        let dir = AgentDirectory::new();
        let agent = dir.register(Agent::new("Ada", ["printing"])).unwrap();
        let err = dir.register(agent.clone()).unwrap_err();
        assert_eq!(err, AssignmentError::AlreadyRegistered { agent_id: agent.agent_id });
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_deactivate_unknown_agent() {
        let dir = AgentDirectory::new();
        assert!(matches!(
            dir.deactivate(AgentId::now_v7()),
            Err(AssignmentError::AgentNotFound { .. })
        ));
    }

    #[test]
    fn test_candidates_respect_skills_and_activity() {
        let dir = AgentDirectory::new();
        let ada = dir.register(Agent::new("Ada", ["printing"])).unwrap();
        let bob = dir.register(Agent::new("Bob", ["network"])).unwrap();
        let cy = dir.register(Agent::new("Cy", ["printing", "network"])).unwrap();
        dir.deactivate(cy.agent_id).unwrap();

        let printing: Vec<_> = dir.candidates(&tags(&["printing"])).into_iter().map(|c| c.0).collect();
        assert_eq!(printing, vec![ada.agent_id]);

        let mut everyone: Vec<_> = dir.candidates(&BTreeSet::new()).into_iter().map(|c| c.0).collect();
        everyone.sort();
        let mut expected = vec![ada.agent_id, bob.agent_id];
        expected.sort();
        assert_eq!(everyone, expected);
    }

    #[test]
    fn test_decrement_saturates() {
        let dir = AgentDirectory::new();
        let ada = dir.register(Agent::new("Ada", ["x"])).unwrap();
        dir.decrement(ada.agent_id);
        assert_eq!(dir.load(ada.agent_id), 0);
        dir.increment(ada.agent_id);
        dir.increment(ada.agent_id);
        dir.decrement(ada.agent_id);
        assert_eq!(dir.load(ada.agent_id), 1);
    }

    #[test]
    fn test_adjust_load_moves_between_agents() {
        let dir = AgentDirectory::new();
        let ada = dir.register(Agent::new("Ada", ["x"])).unwrap();
        let bob = dir.register(Agent::new("Bob", ["x"])).unwrap();

        let mut before = Ticket::from_new(NewTicket::new("s", "", Priority::Low));
        before.status = TicketStatus::Open;
        before.owner = Some(ada.agent_id);
        dir.increment(ada.agent_id);

        let mut after = before.clone();
        after.status = TicketStatus::Open;
        after.owner = Some(bob.agent_id);
        dir.adjust_load(&before, &after);
        assert_eq!(dir.load(ada.agent_id), 0);
        assert_eq!(dir.load(bob.agent_id), 1);

        let mut resolved = after.clone();
        resolved.status = TicketStatus::Resolved;
        dir.adjust_load(&after, &resolved);
        assert_eq!(dir.load(bob.agent_id), 0);

        let pending = Ticket {
            status: TicketStatus::Pending,
            ..after.clone()
        };
        dir.adjust_load(&after, &pending);
        assert_eq!(dir.load(bob.agent_id), 0);
    }

    #[test]
    fn test_rebuild_loads_from_store() {
        let store = InMemoryTicketStore::new();
        let dir = AgentDirectory::new();
        let ada = dir.register(Agent::new("Ada", ["x"])).unwrap();
        let bob = dir.register(Agent::new("Bob", ["x"])).unwrap();
        dir.increment(bob.agent_id);

        for _ in 0..3 {
            let t = store.create(NewTicket::new("s", "", Priority::Low)).unwrap();
            store
                .append_event(EventAppend {
                    ticket_id: t.ticket_id,
                    expected_version: t.version,
                    new_status: TicketStatus::Open,
                    owner: Some(ada.agent_id),
                    actor: Actor::System,
                    note: None,
                })
                .unwrap();
        }

        dir.rebuild_loads(&store).unwrap();
        assert_eq!(dir.load(ada.agent_id), 3);
        assert_eq!(dir.load(bob.agent_id), 0);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let dir = Arc::new(AgentDirectory::new());
        let ada = dir.register(Agent::new("Ada", ["x"])).unwrap();
        let bob = dir.register(Agent::new("Bob", ["x"])).unwrap();

        std::thread::scope(|s| {
            for i in 0..8 {
                let dir = Arc::clone(&dir);
                let target = if i % 2 == 0 { ada.agent_id } else { bob.agent_id };
                s.spawn(move || {
                    for _ in 0..1000 {
                        dir.increment(target);
                    }
                });
            }
        });

        assert_eq!(dir.load(ada.agent_id), 4000);
        assert_eq!(dir.load(bob.agent_id), 4000);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let dir = AgentDirectory::new();
        for name in ["a", "b", "c"] {
            dir.register(Agent::new(name, ["x"])).unwrap();
        }
        let snap = dir.snapshot();
        assert_eq!(snap.len(), 3);
        assert!(snap.windows(2).all(|w| w[0].agent.agent_id < w[1].agent.agent_id));
    }
}
