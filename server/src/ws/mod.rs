pub mod actor;
pub mod handler;
pub mod protocol;

use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// The outbox holds one per connection; the connection's writer task drains it.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Allocate an id for a new connection. Clients see it as their `channel`.
pub fn new_connection_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
