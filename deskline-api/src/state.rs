//! Shared application state handed to every route.

use deskline_agents::AgentDirectory;
use deskline_engine::TransitionEngine;
use deskline_notify::{DeadLetterStore, DispatcherHandle};
use deskline_storage::TicketStore;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub engine: TransitionEngine,
    pub dead_letters: Arc<dyn DeadLetterStore>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: TransitionEngine, dead_letters: Arc<dyn DeadLetterStore>) -> Self {
        Self {
            engine,
            dead_letters,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        self.engine.store()
    }

    pub fn directory(&self) -> &Arc<AgentDirectory> {
        self.engine.directory()
    }

    pub fn notifier(&self) -> &DispatcherHandle {
        self.engine.notifier()
    }
}
