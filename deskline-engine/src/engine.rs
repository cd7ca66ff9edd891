use deskline_agents::{AgentDirectory, AssignmentResolver};
use deskline_core::{
    lifecycle, Actor, AgentId, DesklineResult, EngineConfig, NotificationPayload, Ticket,
    TicketEvent, TicketId, TicketStatus, TransitionError,
};
use deskline_notify::DispatcherHandle;
use deskline_storage::{CommittedEvent, EventAppend, TicketStore};
use std::sync::Arc;
use tokio::sync::watch;

// ============================================================================
// REQUEST
// ============================================================================

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub ticket_id: TicketId,
    pub target: TicketStatus,
    pub actor: Actor,
    pub note: Option<String>,
}

impl TransitionRequest {
    /// Request with no initiator and no note.
    pub fn new(ticket_id: TicketId, target: TicketStatus) -> Self {
        Self {
            ticket_id,
            target,
            actor: Actor::Unattributed,
            note: None,
        }
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Applies validated lifecycle transitions.
///
/// Conflicting concurrent writers are handled by re-reading and retrying up
/// to `max_conflict_attempts` times; each retry validates against fresh
/// state, so a retry may end in `InvalidTransition` instead.
#[derive(Clone)]
pub struct TransitionEngine {
    store: Arc<dyn TicketStore>,
    resolver: AssignmentResolver,
    notifier: DispatcherHandle,
    config: EngineConfig,
}

impl TransitionEngine {
    pub fn new(
        store: Arc<dyn TicketStore>,
        resolver: AssignmentResolver,
        notifier: DispatcherHandle,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<AgentDirectory> {
        self.resolver.directory()
    }

    pub fn notifier(&self) -> &DispatcherHandle {
        &self.notifier
    }

    /// Apply a transition and return the event it produced.
    ///
    /// Exactly one event is appended on success and none on failure.
    pub async fn apply_transition(
        &self,
        request: TransitionRequest,
    ) -> DesklineResult<TicketEvent> {
        self.run(request, None).await
    }

    /// Like [`apply_transition`](Self::apply_transition), but gives up with
    /// `Cancelled` if `cancel` reads true before the commit point. Once the
    /// event is committed the call completes regardless.
    pub async fn apply_transition_cancellable(
        &self,
        request: TransitionRequest,
        cancel: watch::Receiver<bool>,
    ) -> DesklineResult<TicketEvent> {
        self.run(request, Some(&cancel)).await
    }

    /// Audit history of a ticket in sequence order.
    pub fn history(&self, ticket_id: TicketId) -> DesklineResult<Vec<TicketEvent>> {
        self.store.events(ticket_id)
    }

    async fn run(
        &self,
        request: TransitionRequest,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> DesklineResult<TicketEvent> {
        let max_attempts = self.config.max_conflict_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(&request, cancel) {
                Ok(committed) => return Ok(self.after_commit(committed).await),
                Err(e) if e.is_conflict() && attempt < max_attempts => {
                    tracing::debug!(
                        ticket_id = %request.ticket_id,
                        target = %request.target,
                        attempt,
                        "Version conflict, retrying transition"
                    );
                    attempt += 1;
                    tokio::task::yield_now().await;
                }
                Err(e) => {
                    if e.is_conflict() {
                        tracing::warn!(
                            ticket_id = %request.ticket_id,
                            target = %request.target,
                            attempts = attempt,
                            "Transition gave up after repeated conflicts"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    /// One load-validate-assign-commit pass.
    fn attempt(
        &self,
        request: &TransitionRequest,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> DesklineResult<CommittedEvent> {
        self.check_cancelled(request, cancel)?;

        let ticket = self.store.get(request.ticket_id)?;
        lifecycle::validate_transition(ticket.ticket_id, ticket.status, request.target)?;
        let owner = self.owner_after(&ticket, request.target)?;

        self.check_cancelled(request, cancel)?;

        self.store.append_event(EventAppend {
            ticket_id: ticket.ticket_id,
            expected_version: ticket.version,
            new_status: request.target,
            owner,
            actor: request.actor.clone(),
            note: request.note.clone(),
        })
    }

    /// Owner the ticket will have after entering `target`.
    ///
    /// Entering Open needs an active owner: a missing or deactivated one is
    /// replaced through the resolver. Every other target keeps the owner.
    fn owner_after(
        &self,
        ticket: &Ticket,
        target: TicketStatus,
    ) -> DesklineResult<Option<AgentId>> {
        if !lifecycle::requires_owner(target) {
            return Ok(ticket.owner);
        }
        match ticket.owner {
            Some(owner) if self.resolver.directory().is_active(owner) => Ok(Some(owner)),
            previous => {
                let chosen = self.resolver.resolve(ticket)?;
                if let Some(previous) = previous {
                    tracing::info!(
                        ticket_id = %ticket.ticket_id,
                        previous_owner = %previous,
                        agent_id = %chosen,
                        "Reassigning ticket away from inactive agent"
                    );
                }
                Ok(Some(chosen))
            }
        }
    }

    fn check_cancelled(
        &self,
        request: &TransitionRequest,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<(), TransitionError> {
        match cancel {
            Some(rx) if *rx.borrow() => {
                tracing::debug!(
                    ticket_id = %request.ticket_id,
                    "Transition cancelled before commit"
                );
                Err(TransitionError::Cancelled {
                    ticket_id: request.ticket_id,
                    to: request.target,
                })
            }
            _ => Ok(()),
        }
    }

    /// Post-commit bookkeeping. Nothing here can fail the transition.
    async fn after_commit(&self, committed: CommittedEvent) -> TicketEvent {
        let CommittedEvent {
            before,
            ticket,
            event,
        } = committed;

        self.resolver.directory().adjust_load(&before, &ticket);

        tracing::info!(
            ticket_id = %ticket.ticket_id,
            from = %event.prior_status,
            to = %event.new_status,
            owner = ?event.owner,
            actor = %event.actor,
            sequence = event.sequence,
            "Ticket transitioned"
        );

        let payload = NotificationPayload::from_event(&ticket, &event);
        if let Err(e) = self.notifier.enqueue(payload).await {
            tracing::warn!(
                ticket_id = %ticket.ticket_id,
                sequence = event.sequence,
                error = %e,
                "Notification not queued"
            );
        }

        event
    }
}

impl std::fmt::Debug for TransitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionEngine")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}
