//! Ticket lifecycle state machine.
//!
//! | From     | To                         |
//! |----------|----------------------------|
//! | New      | Open, Closed               |
//! | Open     | Pending, Resolved, Closed  |
//! | Pending  | Open                       |
//! | Resolved | Closed, Reopened           |
//! | Reopened | Open                       |
//! | Closed   | (terminal)                 |
//!
//! The table is the single source of truth: every mutation of
//! `Ticket::status` is checked against [`is_allowed`] before it is persisted.

use crate::{TicketId, TicketStatus, TransitionError};

/// Statuses reachable in one step from `from`.
pub fn allowed_targets(from: TicketStatus) -> &'static [TicketStatus] {
    use TicketStatus::*;
    match from {
        New => &[Open, Closed],
        Open => &[Pending, Resolved, Closed],
        Pending => &[Open],
        Resolved => &[Closed, Reopened],
        Reopened => &[Open],
        Closed => &[],
    }
}

/// Whether `from -> to` is a listed transition.
pub fn is_allowed(from: TicketStatus, to: TicketStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Check a transition and produce the error the engine surfaces on failure.
pub fn validate_transition(
    ticket_id: TicketId,
    from: TicketStatus,
    to: TicketStatus,
) -> Result<(), TransitionError> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition { ticket_id, from, to })
    }
}

/// Whether entering `to` requires the ticket to have an owner.
pub fn requires_owner(to: TicketStatus) -> bool {
    matches!(to, TicketStatus::Open)
}

/// Every listed `(from, to)` pair.
pub fn all_transitions() -> impl Iterator<Item = (TicketStatus, TicketStatus)> {
    TicketStatus::ALL
        .into_iter()
        .flat_map(|from| allowed_targets(from).iter().map(move |to| (from, *to)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityIdType;
    use TicketStatus::*;

    #[test]
    fn test_table_matches_lifecycle() {
        let expected = vec![
            (New, Open),
            (New, Closed),
            (Open, Pending),
            (Open, Resolved),
            (Open, Closed),
            (Pending, Open),
            (Resolved, Closed),
            (Resolved, Reopened),
            (Reopened, Open),
        ];
        let actual: Vec<_> = all_transitions().collect();
        assert_eq!(actual.len(), expected.len());
        for pair in expected {
            assert!(actual.contains(&pair), "missing {:?}", pair);
        }
    }

    #[test]
    fn test_closed_has_no_outgoing_transitions() {
        assert!(allowed_targets(Closed).is_empty());
        for to in TicketStatus::ALL {
            assert!(!is_allowed(Closed, to));
        }
    }

    #[test]
    fn test_self_transitions_are_rejected() {
        for status in TicketStatus::ALL {
            assert!(!is_allowed(status, status));
        }
    }

    #[test]
    fn test_validate_transition_error_context() {
        let id = TicketId::now_v7();
        let err = validate_transition(id, Pending, Resolved).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                ticket_id: id,
                from: Pending,
                to: Resolved,
            }
        );
    }

    #[test]
    fn test_only_open_requires_owner() {
        assert!(requires_owner(Open));
        for status in [New, Pending, Resolved, Closed, Reopened] {
            assert!(!requires_owner(status));
        }
    }
}
