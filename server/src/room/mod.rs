//! Per-party room state.
//!
//! Each party with live members has one `Room` behind its own mutex. The
//! membership table, broadcast group and song queue of a party are only
//! touched with that mutex held, which linearizes everything that happens
//! in one party without blocking any other party.
//!
//! Lock order: `rooms` shard, then a room mutex, then `index` shard. No
//! path acquires a room mutex while holding an `index` guard, and nothing
//! touches `rooms` while holding a room mutex.

pub mod broadcast;
pub mod membership;
pub mod playlist;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use broadcast::BroadcastGroup;
use membership::{Colour, Member, MemberId, MemberTable, MembershipError};
use playlist::Playlist;

/// Everything the server tracks for one party.
#[derive(Debug, Default)]
pub struct Room {
    pub members: MemberTable,
    pub group: BroadcastGroup,
    pub playlist: Playlist,
}

/// Party membership store: all rooms, keyed by party id.
#[derive(Default)]
pub struct Rooms {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
    /// member id -> party id
    index: DashMap<MemberId, String>,
    next_member_id: AtomicU64,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an unnamed member in a party. Never fails: capacity is
    /// only enforced when the member names itself.
    pub fn create(&self, party_id: &str, connection_id: &str) -> Member {
        let id = MemberId(self.next_member_id.fetch_add(1, Ordering::Relaxed) + 1);
        let member = Member::new(id, party_id, connection_id);

        // Hold the shard entry while inserting so a concurrent
        // `release_if_empty` cannot drop the room under us.
        let entry = self.rooms.entry(party_id.to_string()).or_default();
        entry.lock().members.insert(member.clone());
        self.index.insert(id, party_id.to_string());
        drop(entry);

        member
    }

    /// Run `f` with the party's room locked. None if the party has no room.
    pub fn with_room<R>(&self, party_id: &str, f: impl FnOnce(&mut Room) -> R) -> Option<R> {
        let room = self.rooms.get(party_id).map(|r| r.value().clone())?;
        let mut guard = room.lock();
        Some(f(&mut guard))
    }

    /// Name a member and assign its colour.
    pub fn set_identity(&self, member_id: MemberId, nick: &str) -> Result<Colour, MembershipError> {
        let party_id = self.party_of(member_id).ok_or(MembershipError::UnknownMember(member_id))?;
        self.with_room(&party_id, |room| room.members.set_identity(member_id, nick))
            .unwrap_or(Err(MembershipError::UnknownMember(member_id)))
    }

    /// Delete a member and return its last state.
    pub fn remove(&self, member_id: MemberId) -> Option<Member> {
        self.remove_with(member_id, |_, _| {})
    }

    /// Delete a member, then run `f` on the room and the removed member
    /// before the room is unlocked. Removing an absent member is a no-op.
    pub fn remove_with(&self, member_id: MemberId, f: impl FnOnce(&mut Room, &Member)) -> Option<Member> {
        let party_id = self.party_of(member_id)?;
        let removed = self
            .with_room(&party_id, |room| {
                let member = room.members.remove(member_id)?;
                self.index.remove(&member_id);
                f(room, &member);
                Some(member)
            })
            .flatten();

        if removed.is_some() {
            self.release_if_empty(&party_id);
        }
        removed
    }

    /// Named members of a party, in join order.
    pub fn list_named(&self, party_id: &str) -> Vec<Member> {
        self.with_room(party_id, |room| room.members.list_named().cloned().collect())
            .unwrap_or_default()
    }

    pub fn party_of(&self, member_id: MemberId) -> Option<String> {
        self.index.get(&member_id).map(|p| p.value().clone())
    }

    pub fn get(&self, member_id: MemberId) -> Option<Member> {
        let party_id = self.party_of(member_id)?;
        self.with_room(&party_id, |room| room.members.get(member_id).cloned())
            .flatten()
    }

    /// Number of parties that currently have a room.
    pub fn active_parties(&self) -> usize {
        self.rooms.len()
    }

    fn release_if_empty(&self, party_id: &str) {
        if self
            .rooms
            .remove_if(party_id, |_, room| room.lock().members.is_empty())
            .is_some()
        {
            tracing::debug!(party_id = %party_id, "Room released");
        }
    }
}
