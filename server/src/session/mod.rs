//! Connection-level session tracking and the protocol state machine.

pub mod binding;
pub mod handler;
pub mod registry;

pub use binding::{MemorySessionStore, SessionBinding, SessionStore};
pub use handler::{ConnectError, SessionHandler};
pub use registry::{ConnectionBinding, ConnectionRegistry};
