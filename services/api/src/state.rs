//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the persona
//! directory, the shared meeting data, and the outbound clients.

use crate::{
    config::Config, meeting::MeetingContext, persona::PersonaDirectory, recall::RecallClient,
    ws::ConnectionManager,
};
use huddle_core::Roster;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub personas: Arc<PersonaDirectory>,
    pub roster: Roster,
    pub connections: Arc<ConnectionManager>,
    pub recall: Arc<RecallClient>,
    pub meeting: MeetingContext,
}

impl AppState {
    /// Whether the primary persona currently has a live session.
    pub fn primary_connected(&self) -> bool {
        self.personas
            .primary()
            .and_then(|profile| self.personas.get(&profile.id))
            .is_some_and(|session| session.is_connected())
    }
}
