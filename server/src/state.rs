use std::sync::Arc;

use crate::party::PartyStore;
use crate::session::{MemorySessionStore, SessionHandler};
use crate::ws::actor::Keepalive;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Party records (SQLite or in-memory)
    pub parties: Arc<dyn PartyStore>,
    /// Live party sessions: membership, broadcast groups, relay
    pub sessions: SessionHandler,
    /// Ping cadence for every party connection
    pub keepalive: Keepalive,
}

impl AppState {
    /// Build state around a party store, with process-local session bindings.
    pub fn new(parties: Arc<dyn PartyStore>) -> Self {
        let sessions = SessionHandler::new(parties.clone(), Arc::new(MemorySessionStore::new()));
        Self {
            parties,
            sessions,
            keepalive: Keepalive::default(),
        }
    }

    pub fn with_keepalive(mut self, keepalive: Keepalive) -> Self {
        self.keepalive = keepalive;
        self
    }
}
