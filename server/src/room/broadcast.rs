//! Outbound delivery: the per-connection outbox and per-party broadcast groups.

use axum::extract::ws::{CloseFrame, Message};
use dashmap::DashMap;
use std::sync::Arc;

use crate::ws::protocol::ServerMessage;
use crate::ws::ConnectionSender;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("no such connection: {0}")]
    UnknownConnection(String),

    #[error("connection {0} is closed")]
    Closed(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Senders for every live connection, keyed by connection id.
///
/// Each sender is an unbounded channel drained by that connection's writer
/// task, so a send never waits on the network.
#[derive(Clone, Default)]
pub struct Outbox {
    senders: Arc<DashMap<String, ConnectionSender>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, connection_id: &str, tx: ConnectionSender) {
        self.senders.insert(connection_id.to_string(), tx);
    }

    pub fn detach(&self, connection_id: &str) -> bool {
        self.senders.remove(connection_id).is_some()
    }

    /// Point-to-point send. An unknown or closed connection is reported,
    /// never fatal.
    pub fn send_to(&self, connection_id: &str, message: &ServerMessage) -> Result<(), DeliveryError> {
        let frame = message.to_frame()?;
        self.deliver(connection_id, frame)
    }

    /// Reply on a connection's own channel. Failures only get logged: the
    /// connection is going away and its disconnect will clean up.
    pub fn send_to_origin(&self, connection_id: &str, message: &ServerMessage) {
        if let Err(e) = self.send_to(connection_id, message) {
            tracing::debug!(connection_id = %connection_id, error = %e, "Reply not delivered");
        }
    }

    /// Queue a close frame. One-way: nothing waits for the client.
    pub fn close(&self, connection_id: &str, code: u16, reason: &str) {
        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }));
        if let Err(e) = self.deliver(connection_id, frame) {
            tracing::debug!(connection_id = %connection_id, error = %e, "Close not delivered");
        }
    }

    fn deliver(&self, connection_id: &str, frame: Message) -> Result<(), DeliveryError> {
        let sender = self
            .senders
            .get(connection_id)
            .ok_or_else(|| DeliveryError::UnknownConnection(connection_id.to_string()))?;
        sender
            .send(frame)
            .map_err(|_| DeliveryError::Closed(connection_id.to_string()))
    }
}

/// Connections subscribed to one party's messages, in join order.
#[derive(Debug, Default)]
pub struct BroadcastGroup {
    subscribers: Vec<String>,
}

impl BroadcastGroup {
    /// Returns false if the connection was already subscribed.
    pub fn join(&mut self, connection_id: &str) -> bool {
        if self.contains(connection_id) {
            return false;
        }
        self.subscribers.push(connection_id.to_string());
        true
    }

    pub fn leave(&mut self, connection_id: &str) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|c| c != connection_id);
        self.subscribers.len() < before
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.subscribers.iter().any(|c| c == connection_id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver to every subscriber. One failed recipient never stops
    /// delivery to the rest. Returns how many deliveries succeeded.
    pub fn broadcast(&self, outbox: &Outbox, message: &ServerMessage) -> usize {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode broadcast");
                return 0;
            }
        };

        let mut delivered = 0;
        for connection_id in &self.subscribers {
            match outbox.deliver(connection_id, frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Broadcast delivery failed");
                }
            }
        }
        delivered
    }
}
