//! Party storage.
//!
//! The session core only ever asks "does this party exist"; creation and
//! deletion are driven from the HTTP routes. Both backends implement the
//! same synchronous trait and are called from `spawn_blocking`.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rusqlite::OptionalExtension;

use crate::db::DbPool;
use crate::party::code::generate_code;

/// Give up on code generation after this many collisions in a row.
const MAX_CODE_ATTEMPTS: usize = 32;

/// A karaoke room, identified by its short code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

impl Party {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("no unused party code found after {0} attempts")]
    CodesExhausted(usize),

    #[error("party {0} has an unreadable creation time")]
    BadTimestamp(String),
}

/// Storage for party records.
pub trait PartyStore: Send + Sync {
    /// Create a party under a freshly generated, unused code.
    fn create_party(&self) -> Result<Party, StoreError>;

    fn get_party(&self, party_id: &str) -> Result<Option<Party>, StoreError>;

    /// Returns false if there was nothing to delete.
    fn delete_party(&self, party_id: &str) -> Result<bool, StoreError>;

    fn party_exists(&self, party_id: &str) -> Result<bool, StoreError> {
        Ok(self.get_party(party_id)?.is_some())
    }
}

/// Draw codes from `next_code` until `try_insert` accepts one.
fn insert_unique<F, G>(mut next_code: G, mut try_insert: F) -> Result<Party, StoreError>
where
    G: FnMut() -> String,
    F: FnMut(&Party) -> Result<bool, StoreError>,
{
    for _ in 0..MAX_CODE_ATTEMPTS {
        let party = Party::new(next_code());
        if try_insert(&party)? {
            return Ok(party);
        }
        tracing::debug!(party_id = %party.id, "Party code collision, retrying");
    }
    Err(StoreError::CodesExhausted(MAX_CODE_ATTEMPTS))
}

/// SQLite-backed party store.
#[derive(Clone)]
pub struct SqlitePartyStore {
    db: DbPool,
}

impl SqlitePartyStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl PartyStore for SqlitePartyStore {
    fn create_party(&self) -> Result<Party, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        insert_unique(generate_code, |party| {
            let inserted = conn.execute(
                "INSERT INTO parties (id, created_at) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING",
                rusqlite::params![party.id, party.created_at.to_rfc3339()],
            )?;
            Ok(inserted == 1)
        })
    }

    fn get_party(&self, party_id: &str) -> Result<Option<Party>, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        let created_at: Option<String> = conn
            .query_row(
                "SELECT created_at FROM parties WHERE id = ?1",
                [party_id],
                |row| row.get(0),
            )
            .optional()?;

        created_at
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|t| Party {
                        id: party_id.to_string(),
                        created_at: t.with_timezone(&Utc),
                    })
                    .map_err(|_| StoreError::BadTimestamp(party_id.to_string()))
            })
            .transpose()
    }

    fn delete_party(&self, party_id: &str) -> Result<bool, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        let deleted = conn.execute("DELETE FROM parties WHERE id = ?1", [party_id])?;
        Ok(deleted > 0)
    }
}

/// In-memory party store, used with `--in-memory` and in tests.
#[derive(Debug, Default)]
pub struct MemoryPartyStore {
    parties: DashMap<String, Party>,
}

impl MemoryPartyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a party with a caller-chosen code, replacing any existing one.
    pub fn insert(&self, party: Party) {
        self.parties.insert(party.id.clone(), party);
    }
}

impl PartyStore for MemoryPartyStore {
    fn create_party(&self) -> Result<Party, StoreError> {
        insert_unique(generate_code, |party| {
            Ok(match self.parties.entry(party.id.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(party.clone());
                    true
                }
            })
        })
    }

    fn get_party(&self, party_id: &str) -> Result<Option<Party>, StoreError> {
        Ok(self.parties.get(party_id).map(|p| p.value().clone()))
    }

    fn delete_party(&self, party_id: &str) -> Result<bool, StoreError> {
        Ok(self.parties.remove(party_id).is_some())
    }
}
