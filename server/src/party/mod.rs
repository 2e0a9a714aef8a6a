//! Parties: creation, lookup and the storage seam the session core consults.

pub mod code;
pub mod routes;
pub mod store;

pub use store::{MemoryPartyStore, Party, PartyStore, SqlitePartyStore, StoreError};
