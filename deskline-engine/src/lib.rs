//! Deskline Engine - Ticket Lifecycle Transitions
//!
//! [`TransitionEngine`] is the only writer of ticket status and ownership.
//! A transition is loaded, validated against the lifecycle table, assigned an
//! owner when it enters Open, committed with an optimistic version check and
//! finally announced to the notification dispatcher.

mod engine;

pub use engine::{TransitionEngine, TransitionRequest};
