//! Shared wiring for engine integration tests.

#![allow(dead_code)]

use deskline_agents::{AgentDirectory, AssignmentResolver, KeywordClassifier};
use deskline_core::{AgentId, DispatcherConfig, EngineConfig, TicketStatus};
use deskline_engine::TransitionEngine;
use deskline_notify::{
    DeadLetterStore, DispatcherRuntime, DispatcherSnapshot, InMemoryDeadLetterStore,
    NotificationDispatcher,
};
use deskline_storage::TicketStore;
use deskline_test_utils::{fixtures, InMemoryTicketStore, RecordingChannel, Ticket};
use std::sync::Arc;
use std::time::Duration;

/// A fully wired engine over in-memory parts.
pub struct Harness {
    pub memory: Arc<InMemoryTicketStore>,
    pub store: Arc<dyn TicketStore>,
    pub directory: Arc<AgentDirectory>,
    pub channel: Arc<RecordingChannel>,
    pub dead_letters: Arc<InMemoryDeadLetterStore>,
    pub engine: TransitionEngine,
    runtime: DispatcherRuntime,
}

impl Harness {
    /// Default wiring with a channel that always succeeds.
    pub fn new() -> Self {
        Self::build(None, RecordingChannel::new("webhook"), DispatcherConfig::default())
    }

    pub fn with_channel(channel: Arc<RecordingChannel>, config: DispatcherConfig) -> Self {
        Self::build(None, channel, config)
    }

    /// Use `store` in front of the in-memory store, e.g. a conflict injector.
    pub fn with_store(
        memory: Arc<InMemoryTicketStore>,
        store: Arc<dyn TicketStore>,
    ) -> Self {
        Self::build(
            Some((memory, store)),
            RecordingChannel::new("webhook"),
            DispatcherConfig::default(),
        )
    }

    fn build(
        stores: Option<(Arc<InMemoryTicketStore>, Arc<dyn TicketStore>)>,
        channel: Arc<RecordingChannel>,
        config: DispatcherConfig,
    ) -> Self {
        let (memory, store) = stores.unwrap_or_else(|| {
            let memory = Arc::new(InMemoryTicketStore::new());
            let store: Arc<dyn TicketStore> = memory.clone();
            (memory, store)
        });
        let directory = Arc::new(AgentDirectory::new());
        let classifier = KeywordClassifier::standard("general").unwrap();
        let resolver = AssignmentResolver::new(directory.clone(), Arc::new(classifier));

        let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
        let letters: Arc<dyn DeadLetterStore> = dead_letters.clone();
        let (handle, runtime) =
            NotificationDispatcher::start(&config, vec![channel.as_channel()], letters);

        let engine = TransitionEngine::new(store.clone(), resolver, handle, EngineConfig::default());
        Self {
            memory,
            store,
            directory,
            channel,
            dead_letters,
            engine,
            runtime,
        }
    }

    /// Register an active agent and return its id.
    pub fn agent(&self, name: &str, skills: &[&str]) -> AgentId {
        self.directory
            .register(fixtures::agent(name, skills))
            .unwrap()
            .agent_id
    }

    /// Seed a ticket directly in `status` and count it toward the owner's load.
    pub fn seed(&self, status: TicketStatus, owner: Option<AgentId>) -> Ticket {
        let ticket = fixtures::seed_ticket(&self.memory, status, owner);
        if ticket.counts_toward_load() {
            if let Some(owner) = ticket.owner {
                self.directory.increment(owner);
            }
        }
        ticket
    }

    pub fn event_count(&self, ticket: &Ticket) -> usize {
        self.store.events(ticket.ticket_id).unwrap().len()
    }

    /// Poll until `count` payloads were delivered, failing after ~10 seconds.
    pub async fn wait_for_deliveries(&self, count: usize) {
        for _ in 0..1000 {
            if self.channel.sent().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} deliveries, saw {}",
            count,
            self.channel.sent().len()
        );
    }

    /// Poll until `count` dead letters were recorded.
    pub async fn wait_for_dead_letters(&self, count: usize) {
        for _ in 0..1000 {
            if self.dead_letters.len().await >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!(
            "expected {} dead letters, saw {}",
            count,
            self.dead_letters.len().await
        );
    }

    pub async fn shutdown(self) -> DispatcherSnapshot {
        self.runtime.shutdown().await
    }
}
