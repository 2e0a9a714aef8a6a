use dashmap::DashMap;
use std::sync::Arc;

use crate::room::membership::MemberId;

/// What a live connection currently owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionBinding {
    pub party_id: String,
    pub member_id: MemberId,
    /// The logical client session this connection was opened under.
    pub client_session: String,
}

/// Connection registry: connection id -> the member it owns.
///
/// A connection is bound from accept until it disconnects or is evicted
/// by a newer connection of the same client session.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    bindings: Arc<DashMap<String, ConnectionBinding>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, connection_id: &str, binding: ConnectionBinding) {
        self.bindings.insert(connection_id.to_string(), binding);
    }

    pub fn lookup(&self, connection_id: &str) -> Option<ConnectionBinding> {
        self.bindings.get(connection_id).map(|b| b.value().clone())
    }

    /// Remove and return the binding, if any.
    pub fn unbind(&self, connection_id: &str) -> Option<ConnectionBinding> {
        self.bindings.remove(connection_id).map(|(_, b)| b)
    }

    /// Unbind only if the connection still owns `member_id`.
    pub fn unbind_member(&self, connection_id: &str, member_id: MemberId) -> Option<ConnectionBinding> {
        self.bindings
            .remove_if(connection_id, |_, b| b.member_id == member_id)
            .map(|(_, b)| b)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
