//! Client session bindings.
//!
//! A browser keeps one logical session across reconnects. The binding
//! records which member that session last owned, so a new connection can
//! find and evict a member whose connection was never cleanly closed.

use dashmap::DashMap;

use crate::room::membership::MemberId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBinding {
    pub party_id: String,
    pub member_id: MemberId,
    pub connection_id: String,
}

/// Storage for client session bindings.
pub trait SessionStore: Send + Sync {
    fn issue(&self, client_session: &str, binding: SessionBinding);

    fn read(&self, client_session: &str) -> Option<SessionBinding>;

    fn clear(&self, client_session: &str);

    /// Clear the binding only if it still points at `member_id`.
    /// Returns true if something was cleared.
    fn clear_member(&self, client_session: &str, member_id: MemberId) -> bool {
        match self.read(client_session) {
            Some(binding) if binding.member_id == member_id => {
                self.clear(client_session);
                true
            }
            _ => false,
        }
    }
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    bindings: DashMap<String, SessionBinding>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn issue(&self, client_session: &str, binding: SessionBinding) {
        self.bindings.insert(client_session.to_string(), binding);
    }

    fn read(&self, client_session: &str) -> Option<SessionBinding> {
        self.bindings.get(client_session).map(|b| b.value().clone())
    }

    fn clear(&self, client_session: &str) {
        self.bindings.remove(client_session);
    }

    fn clear_member(&self, client_session: &str, member_id: MemberId) -> bool {
        self.bindings
            .remove_if(client_session, |_, b| b.member_id == member_id)
            .is_some()
    }
}
