//! Member records for one party, with capacity and colour assignment.
//!
//! A `MemberTable` is only ever touched while its room's lock is held, so
//! the capacity check and colour pick here are atomic with respect to other
//! joins of the same party.

use serde::Serialize;
use std::fmt;

/// Most members with a nickname a party may hold at once.
pub const MAX_NAMED_MEMBERS: usize = 6;

/// Longest nickname kept, in characters.
pub const MAX_NICK_LEN: usize = 30;

/// Trim a requested nickname and cut it to `MAX_NICK_LEN` characters.
/// None if nothing is left.
pub fn normalize_nick(raw: &str) -> Option<String> {
    let nick: String = raw.trim().chars().take(MAX_NICK_LEN).collect();
    let nick = nick.trim_end();
    (!nick.is_empty()).then(|| nick.to_string())
}

/// Member colours, assigned in this order.
pub const PALETTE: [Colour; MAX_NAMED_MEMBERS] = [
    Colour("#058fbe"),
    Colour("#d70000"),
    Colour("#00b100"),
    Colour("#a300c4"),
    Colour("#ee7600"),
    Colour("#122b53"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Colour(pub &'static str);

impl Colour {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Member id, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One participant's live session within a party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub party_id: String,
    pub connection_id: String,
    /// None until the member completes the `hello` handshake.
    pub nick: Option<String>,
    pub colour: Option<Colour>,
}

impl Member {
    pub fn new(id: MemberId, party_id: &str, connection_id: &str) -> Self {
        Self {
            id,
            party_id: party_id.to_string(),
            connection_id: connection_id.to_string(),
            nick: None,
            colour: None,
        }
    }

    /// Named members have been announced to the room.
    pub fn is_named(&self) -> bool {
        self.nick.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MembershipError {
    #[error("party already has {} members", MAX_NAMED_MEMBERS)]
    CapacityExceeded,

    #[error("no such member: {0}")]
    UnknownMember(MemberId),
}

/// Members of one party, in join order.
#[derive(Debug, Default)]
pub struct MemberTable {
    members: Vec<Member>,
}

impl MemberTable {
    pub fn insert(&mut self, member: Member) {
        self.members.push(member);
    }

    pub fn get(&self, member_id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == member_id)
    }

    /// Name a member and give it a colour.
    ///
    /// Fails if six other members are already named. A member that already
    /// has a colour keeps it.
    pub fn set_identity(&mut self, member_id: MemberId, nick: &str) -> Result<Colour, MembershipError> {
        let index = self
            .members
            .iter()
            .position(|m| m.id == member_id)
            .ok_or(MembershipError::UnknownMember(member_id))?;

        let others = || {
            self.members
                .iter()
                .filter(move |m| m.id != member_id && m.is_named())
        };

        if others().count() >= MAX_NAMED_MEMBERS {
            return Err(MembershipError::CapacityExceeded);
        }

        let colour = match self.members[index].colour {
            Some(colour) => colour,
            None => {
                let used: Vec<Colour> = others().filter_map(|m| m.colour).collect();
                PALETTE
                    .iter()
                    .copied()
                    .find(|c| !used.contains(c))
                    .ok_or(MembershipError::CapacityExceeded)?
            }
        };

        let member = &mut self.members[index];
        member.nick = Some(nick.to_string());
        member.colour = Some(colour);
        Ok(colour)
    }

    pub fn remove(&mut self, member_id: MemberId) -> Option<Member> {
        let index = self.members.iter().position(|m| m.id == member_id)?;
        Some(self.members.remove(index))
    }

    /// All named members, in join order.
    pub fn list_named(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.is_named())
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
