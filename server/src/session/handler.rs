//! Session protocol handler.
//!
//! Drives each connection through `Unbound -> Joined -> Active -> Closed`:
//! - connect: party must exist; a stale member left behind by the same
//!   client session is evicted; a fresh unnamed member is created and the
//!   connection is greeted with its own id.
//! - `hello`: the member is named and coloured, receives the member list,
//!   and the whole room (itself included) gets `new_member`.
//! - `relay`: point-to-point forward, no membership involved.
//! - disconnect: the member is removed and, if it was named, the room is
//!   told it left. Safe to call more than once.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::party::{PartyStore, StoreError};
use crate::room::membership::{normalize_nick, Member, MemberId, MembershipError};
use crate::room::broadcast::Outbox;
use crate::room::{Room, Rooms};
use crate::session::binding::{SessionBinding, SessionStore};
use crate::session::registry::{ConnectionBinding, ConnectionRegistry};
use crate::ws::protocol::{ClientMessage, MemberSummary, ServerMessage, ROOM_FULL};
use crate::ws::ConnectionSender;

/// Close code sent after `goodbye`.
const CLOSE_NORMAL: u16 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("party {0} does not exist")]
    PartyNotFound(String),

    #[error("party lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("party lookup task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Queue edits a named member may make.
#[derive(Debug, Clone, Copy)]
enum QueueEdit {
    Add(i64),
    Remove(i64),
}

#[derive(Clone)]
pub struct SessionHandler {
    parties: Arc<dyn PartyStore>,
    sessions: Arc<dyn SessionStore>,
    registry: ConnectionRegistry,
    rooms: Arc<Rooms>,
    outbox: Outbox,
}

impl SessionHandler {
    pub fn new(parties: Arc<dyn PartyStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            parties,
            sessions,
            registry: ConnectionRegistry::new(),
            rooms: Arc::new(Rooms::new()),
            outbox: Outbox::new(),
        }
    }

    pub fn rooms(&self) -> &Rooms {
        &self.rooms
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Accept a connection into a party.
    ///
    /// `tx` is the connection's outbound channel; the `hello` greeting is
    /// queued on it before this returns.
    pub async fn connect(
        &self,
        party_id: &str,
        connection_id: &str,
        client_session: &str,
        tx: ConnectionSender,
    ) -> Result<Member, ConnectError> {
        // The only blocking call, made before any room is touched.
        let parties = self.parties.clone();
        let id = party_id.to_string();
        let exists = tokio::task::spawn_blocking(move || parties.party_exists(&id)).await??;
        if !exists {
            tracing::warn!(party_id = %party_id, connection_id = %connection_id, "Connect to unknown party");
            return Err(ConnectError::PartyNotFound(party_id.to_string()));
        }

        if let Some(stale) = self.sessions.read(client_session) {
            self.evict_stale(&stale);
            self.sessions.clear_member(client_session, stale.member_id);
        }

        let member = self.rooms.create(party_id, connection_id);
        self.outbox.attach(connection_id, tx);
        self.registry.bind(
            connection_id,
            ConnectionBinding {
                party_id: party_id.to_string(),
                member_id: member.id,
                client_session: client_session.to_string(),
            },
        );
        self.sessions.issue(
            client_session,
            SessionBinding {
                party_id: party_id.to_string(),
                member_id: member.id,
                connection_id: connection_id.to_string(),
            },
        );

        self.outbox.send_to_origin(
            connection_id,
            &ServerMessage::Hello {
                channel: connection_id.to_string(),
            },
        );

        tracing::info!(
            party_id = %party_id,
            connection_id = %connection_id,
            member_id = %member.id,
            "Connection accepted"
        );
        Ok(member)
    }

    /// Dispatch one inbound text frame.
    pub fn handle_text(&self, connection_id: &str, text: &str) {
        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %e,
                    "Ignoring unreadable message: {}",
                    text.chars().take(100).collect::<String>()
                );
                return;
            }
        };

        match message {
            ClientMessage::Hello { nick } => self.hello(connection_id, &nick),
            ClientMessage::Relay { target, message } => self.relay(connection_id, &target, message),
            ClientMessage::AddToQueue { song } => self.edit_queue(connection_id, QueueEdit::Add(song)),
            ClientMessage::RemoveFromQueue { song } => {
                self.edit_queue(connection_id, QueueEdit::Remove(song))
            }
        }
    }

    /// Tear down whatever the connection still owns. Idempotent.
    pub fn disconnect(&self, connection_id: &str) {
        self.outbox.detach(connection_id);

        let Some(binding) = self.registry.unbind(connection_id) else {
            tracing::debug!(connection_id = %connection_id, "Disconnect for unbound connection");
            return;
        };

        let removed = self
            .rooms
            .remove_with(binding.member_id, |room, member| self.announce_departure(room, member));
        self.sessions.clear_member(&binding.client_session, binding.member_id);

        tracing::info!(
            party_id = %binding.party_id,
            connection_id = %connection_id,
            named = removed.as_ref().is_some_and(Member::is_named),
            "Connection closed"
        );
    }

    fn hello(&self, connection_id: &str, raw_nick: &str) {
        let Some(binding) = self.registry.lookup(connection_id) else {
            tracing::debug!(connection_id = %connection_id, "hello from unbound connection");
            return;
        };
        let Some(nick) = normalize_nick(raw_nick) else {
            tracing::debug!(connection_id = %connection_id, "Ignoring hello with blank nick");
            return;
        };
        let nick = nick.as_str();
        let member_id = binding.member_id;

        let outcome = self
            .rooms
            .with_room(&binding.party_id, |room| {
                let colour = room.members.set_identity(member_id, nick)?;

                let members: BTreeMap<String, MemberSummary> = room
                    .members
                    .list_named()
                    .filter(|m| m.id != member_id)
                    .filter_map(|m| {
                        Some((
                            m.connection_id.clone(),
                            MemberSummary {
                                nick: m.nick.clone()?,
                                colour: m.colour?,
                            },
                        ))
                    })
                    .collect();

                room.group.join(connection_id);
                self.outbox
                    .send_to_origin(connection_id, &ServerMessage::MemberList { members });
                room.group.broadcast(
                    &self.outbox,
                    &ServerMessage::NewMember {
                        channel: connection_id.to_string(),
                        nick: nick.to_string(),
                        colour,
                    },
                );
                if !room.playlist.is_empty() {
                    self.outbox.send_to_origin(
                        connection_id,
                        &ServerMessage::Playlist {
                            playlist: room.playlist.songs().to_vec(),
                        },
                    );
                }
                Ok(colour)
            })
            .unwrap_or(Err(MembershipError::UnknownMember(member_id)));

        match outcome {
            Ok(colour) => {
                tracing::info!(
                    party_id = %binding.party_id,
                    connection_id = %connection_id,
                    nick = %nick,
                    colour = %colour,
                    "Member joined"
                );
            }
            Err(MembershipError::CapacityExceeded) => {
                tracing::warn!(party_id = %binding.party_id, connection_id = %connection_id, "Party full");
                self.reject_room_full(connection_id, &binding);
            }
            Err(MembershipError::UnknownMember(_)) => {
                tracing::debug!(connection_id = %connection_id, "hello for a member already removed");
            }
        }
    }

    /// Say goodbye and close. The member is dropped right away so it never
    /// lingers in the registry or in listings while the close is in flight.
    fn reject_room_full(&self, connection_id: &str, binding: &ConnectionBinding) {
        self.outbox.send_to_origin(
            connection_id,
            &ServerMessage::Goodbye {
                message: ROOM_FULL.to_string(),
            },
        );
        self.registry.unbind_member(connection_id, binding.member_id);
        self.rooms.remove(binding.member_id);
        self.sessions.clear_member(&binding.client_session, binding.member_id);
        self.outbox.close(connection_id, CLOSE_NORMAL, ROOM_FULL);
    }

    fn relay(&self, origin: &str, target: &str, message: serde_json::Value) {
        if self.registry.lookup(origin).is_none() {
            tracing::debug!(connection_id = %origin, "relay from unbound connection");
            return;
        }

        let envelope = ServerMessage::Relay {
            origin: origin.to_string(),
            message,
        };
        if let Err(e) = self.outbox.send_to(target, &envelope) {
            tracing::debug!(origin = %origin, target = %target, error = %e, "Relay dropped");
        }
    }

    fn edit_queue(&self, connection_id: &str, edit: QueueEdit) {
        let Some(binding) = self.registry.lookup(connection_id) else {
            return;
        };

        self.rooms.with_room(&binding.party_id, |room| {
            let named = room
                .members
                .get(binding.member_id)
                .is_some_and(Member::is_named);
            if !named {
                tracing::debug!(connection_id = %connection_id, "Queue edit before hello");
                return;
            }

            let changed = match edit {
                QueueEdit::Add(song) => {
                    room.playlist.add(song);
                    true
                }
                QueueEdit::Remove(song) => room.playlist.remove(song),
            };
            if changed {
                room.group.broadcast(
                    &self.outbox,
                    &ServerMessage::Playlist {
                        playlist: room.playlist.songs().to_vec(),
                    },
                );
            }
        });
    }

    /// Remove a member left behind by an earlier connection of the same
    /// client session. Its connection is unbound so that connection's own
    /// disconnect later does nothing.
    fn evict_stale(&self, stale: &SessionBinding) {
        self.registry.unbind_member(&stale.connection_id, stale.member_id);

        let evicted = self
            .rooms
            .remove_with(stale.member_id, |room, member| self.announce_departure(room, member));

        if let Some(member) = evicted {
            tracing::info!(
                party_id = %member.party_id,
                connection_id = %member.connection_id,
                member_id = %member.id,
                "Evicted stale session member"
            );
        }
    }

    /// Unnamed members were never announced, so they leave silently.
    fn announce_departure(&self, room: &mut Room, member: &Member) {
        let Some(nick) = &member.nick else {
            return;
        };
        room.group.leave(&member.connection_id);
        room.group.broadcast(
            &self.outbox,
            &ServerMessage::MemberLeft {
                channel: member.connection_id.clone(),
                nick: nick.clone(),
            },
        );
    }

    /// Look up a member by id.
    pub fn member(&self, member_id: MemberId) -> Option<Member> {
        self.rooms.get(member_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::party::{MemoryPartyStore, Party};
    use crate::room::membership::{MAX_NICK_LEN, PALETTE};
    use crate::session::binding::MemorySessionStore;
    use axum::extract::ws::Message;
    use serde_json::{json, Value};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    const PARTY: &str = "ABCD1234";

    fn handler() -> SessionHandler {
        let parties = MemoryPartyStore::new();
        parties.insert(Party::new(PARTY));
        SessionHandler::new(Arc::new(parties), Arc::new(MemorySessionStore::new()))
    }

    async fn join(h: &SessionHandler, conn: &str, session: &str) -> UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        h.connect(PARTY, conn, session, tx).await.expect("connect");
        rx
    }

    /// Drain queued text frames as JSON.
    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                out.push(serde_json::from_str(text.as_str()).expect("valid json"));
            }
        }
        out
    }

    fn hello(h: &SessionHandler, conn: &str, nick: &str) {
        h.handle_text(conn, &json!({"action": "hello", "nick": nick}).to_string());
    }

    #[tokio::test]
    async fn two_member_scenario() {
        let h = handler();

        let mut c1 = join(&h, "c1", "s1").await;
        assert_eq!(drain(&mut c1), vec![json!({"action": "hello", "channel": "c1"})]);

        hello(&h, "c1", "Rarity");
        assert_eq!(
            drain(&mut c1),
            vec![
                json!({"action": "member_list", "members": {}}),
                json!({"action": "new_member", "channel": "c1", "nick": "Rarity", "colour": "#058fbe"}),
            ]
        );

        let mut c2 = join(&h, "c2", "s2").await;
        drain(&mut c2);
        hello(&h, "c2", "Twilight");
        let new_member = json!({"action": "new_member", "channel": "c2", "nick": "Twilight", "colour": "#d70000"});
        assert_eq!(
            drain(&mut c2),
            vec![
                json!({"action": "member_list", "members": {"c1": {"nick": "Rarity", "colour": "#058fbe"}}}),
                new_member.clone(),
            ]
        );
        assert_eq!(drain(&mut c1), vec![new_member]);

        h.disconnect("c1");
        assert_eq!(
            drain(&mut c2),
            vec![json!({"action": "member_left", "channel": "c1", "nick": "Rarity"})]
        );
        assert_eq!(h.rooms().list_named(PARTY).len(), 1);
    }

    #[tokio::test]
    async fn unknown_party_is_rejected() {
        let h = handler();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = h.connect("NOPE0000", "c1", "s1", tx).await.unwrap_err();
        assert!(matches!(err, ConnectError::PartyNotFound(id) if id == "NOPE0000"));
        assert!(h.registry().is_empty());
        assert_eq!(h.rooms().active_parties(), 0);
    }

    #[tokio::test]
    async fn unnamed_disconnect_is_silent() {
        let h = handler();
        let mut c1 = join(&h, "c1", "s1").await;
        hello(&h, "c1", "Rarity");
        drain(&mut c1);

        let _c2 = join(&h, "c2", "s2").await;
        h.disconnect("c2");
        assert!(drain(&mut c1).is_empty());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let h = handler();
        let mut c1 = join(&h, "c1", "s1").await;
        hello(&h, "c1", "Rarity");
        let mut c2 = join(&h, "c2", "s2").await;
        hello(&h, "c2", "Twilight");
        drain(&mut c1);
        drain(&mut c2);

        h.disconnect("c1");
        h.disconnect("c1");
        assert_eq!(drain(&mut c2).len(), 1);
        assert!(h.registry().lookup("c1").is_none());
    }

    #[tokio::test]
    async fn reconnect_evicts_stale_member() {
        let h = handler();
        let mut old = join(&h, "old", "s1").await;
        hello(&h, "old", "Rarity");
        let mut c2 = join(&h, "c2", "s2").await;
        hello(&h, "c2", "Twilight");
        drain(&mut old);
        drain(&mut c2);

        let mut new = join(&h, "new", "s1").await;
        assert_eq!(
            drain(&mut c2),
            vec![json!({"action": "member_left", "channel": "old", "nick": "Rarity"})]
        );
        assert_eq!(drain(&mut new), vec![json!({"action": "hello", "channel": "new"})]);
        assert!(h.registry().lookup("old").is_none());

        // The old socket finally closing must not touch the new member.
        h.disconnect("old");
        assert!(drain(&mut c2).is_empty());
        hello(&h, "new", "Rarity");
        let list = drain(&mut new);
        assert_eq!(
            list[0],
            json!({"action": "member_list", "members": {"c2": {"nick": "Twilight", "colour": "#d70000"}}})
        );
        assert_eq!(list[1]["colour"], json!("#058fbe"));
    }

    #[tokio::test]
    async fn reconnect_after_unnamed_member_is_silent() {
        let h = handler();
        let mut c2 = join(&h, "c2", "s2").await;
        hello(&h, "c2", "Twilight");
        drain(&mut c2);

        // Prior connection never said hello.
        let _old = join(&h, "old", "s1").await;
        let mut new = join(&h, "new", "s1").await;

        assert!(drain(&mut c2).is_empty());
        assert_eq!(drain(&mut new), vec![json!({"action": "hello", "channel": "new"})]);
        assert!(h.registry().lookup("old").is_none());
        assert_eq!(h.registry().len(), 2);

        h.disconnect("old");
        assert!(drain(&mut c2).is_empty());
        assert!(h.registry().lookup("new").is_some());
    }

    #[tokio::test]
    async fn nicknames_are_normalized_before_broadcast() {
        let h = handler();
        let mut c1 = join(&h, "c1", "s1").await;
        drain(&mut c1);

        hello(&h, "c1", "   ");
        assert!(drain(&mut c1).is_empty());
        assert!(h.rooms().list_named(PARTY).is_empty());

        hello(&h, "c1", &format!("  {}", "x".repeat(5000)));
        let frames = drain(&mut c1);
        assert_eq!(frames[1]["action"], "new_member");
        assert_eq!(frames[1]["nick"], json!("x".repeat(MAX_NICK_LEN)));
        assert_eq!(
            h.rooms().list_named(PARTY)[0].nick.as_deref(),
            Some("x".repeat(MAX_NICK_LEN).as_str())
        );
    }

    #[tokio::test]
    async fn seventh_member_gets_goodbye_and_close() {
        let h = handler();
        let mut receivers = Vec::new();
        for i in 1..=6 {
            let conn = format!("c{i}");
            let rx = join(&h, &conn, &format!("s{i}")).await;
            hello(&h, &conn, &format!("m{i}"));
            receivers.push(rx);
        }
        for rx in receivers.iter_mut() {
            drain(rx);
        }

        let mut late = join(&h, "c7", "s7").await;
        drain(&mut late);
        hello(&h, "c7", "late");

        assert_eq!(
            late.try_recv().ok().and_then(|m| match m {
                Message::Text(t) => serde_json::from_str::<Value>(t.as_str()).ok(),
                _ => None,
            }),
            Some(json!({"action": "goodbye", "message": "room_full"}))
        );
        assert!(matches!(late.try_recv(), Ok(Message::Close(Some(_)))));

        for rx in receivers.iter_mut() {
            assert!(drain(rx).is_empty(), "room saw the rejected member");
        }
        assert!(h.registry().lookup("c7").is_none());
        assert_eq!(h.rooms().list_named(PARTY).len(), 6);

        // The transport disconnect that follows is a no-op.
        h.disconnect("c7");
        assert_eq!(h.registry().len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_hellos_admit_six() {
        let h = handler();
        let mut receivers = Vec::new();
        for i in 0..7 {
            receivers.push(join(&h, &format!("c{i}"), &format!("s{i}")).await);
        }

        let tasks: Vec<_> = (0..7)
            .map(|i| {
                let h = h.clone();
                tokio::task::spawn_blocking(move || hello(&h, &format!("c{i}"), &format!("m{i}")))
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let mut goodbyes = 0;
        let mut colours = Vec::new();
        for (i, rx) in receivers.iter_mut().enumerate() {
            for msg in drain(rx) {
                match msg["action"].as_str() {
                    Some("goodbye") => goodbyes += 1,
                    Some("new_member") if msg["channel"] == format!("c{i}") => {
                        colours.push(msg["colour"].as_str().unwrap().to_string())
                    }
                    _ => {}
                }
            }
        }

        assert_eq!(goodbyes, 1);
        assert_eq!(colours.len(), 6);
        colours.sort();
        colours.dedup();
        assert_eq!(colours.len(), 6);
        assert_eq!(h.rooms().list_named(PARTY).len(), 6);
    }

    #[tokio::test]
    async fn relay_is_point_to_point() {
        let h = handler();
        let mut c1 = join(&h, "c1", "s1").await;
        let mut c2 = join(&h, "c2", "s2").await;
        let mut c3 = join(&h, "c3", "s3").await;
        drain(&mut c1);
        drain(&mut c2);
        drain(&mut c3);

        h.handle_text(
            "c1",
            &json!({"action": "relay", "target": "c2", "message": {"action": "rtc-start", "sdp": "x"}})
                .to_string(),
        );
        assert_eq!(
            drain(&mut c2),
            vec![json!({"action": "relay", "origin": "c1", "message": {"action": "rtc-start", "sdp": "x"}})]
        );
        assert!(drain(&mut c1).is_empty());
        assert!(drain(&mut c3).is_empty());
    }

    #[tokio::test]
    async fn relay_to_unknown_target_is_dropped() {
        let h = handler();
        let mut c1 = join(&h, "c1", "s1").await;
        drain(&mut c1);
        h.handle_text("c1", r#"{"action":"relay","target":"ghost","message":1}"#);
        assert!(drain(&mut c1).is_empty());
    }

    #[tokio::test]
    async fn garbage_is_ignored() {
        let h = handler();
        let mut c1 = join(&h, "c1", "s1").await;
        drain(&mut c1);
        h.handle_text("c1", "{not json");
        h.handle_text("c1", r#"{"action":"explode"}"#);
        assert!(drain(&mut c1).is_empty());
        assert!(h.registry().lookup("c1").is_some());
    }

    #[tokio::test]
    async fn queue_edits_are_broadcast() {
        let h = handler();
        let mut c1 = join(&h, "c1", "s1").await;
        let mut c2 = join(&h, "c2", "s2").await;

        // Not yet named: ignored.
        h.handle_text("c1", r#"{"action":"addToQueue","song":5}"#);

        hello(&h, "c1", "Rarity");
        h.handle_text("c1", r#"{"action":"addToQueue","song":5}"#);
        h.handle_text("c1", r#"{"action":"addToQueue","song":9}"#);
        drain(&mut c1);

        hello(&h, "c2", "Twilight");
        let joined = drain(&mut c2);
        assert_eq!(joined.last(), Some(&json!({"action": "playlist", "playlist": [5, 9]})));

        h.handle_text("c2", r#"{"action":"removeFromQueue","song":5}"#);
        let expected = vec![json!({"action": "playlist", "playlist": [9]})];
        assert_eq!(drain(&mut c2), expected);
        assert_eq!(drain(&mut c1)[1..], expected[..]);

        h.handle_text("c2", r#"{"action":"removeFromQueue","song":77}"#);
        assert!(drain(&mut c1).is_empty());
    }

    #[tokio::test]
    async fn colour_reused_after_departure() {
        let h = handler();
        let _c1 = join(&h, "c1", "s1").await;
        hello(&h, "c1", "a");
        let _c2 = join(&h, "c2", "s2").await;
        hello(&h, "c2", "b");
        h.disconnect("c1");

        let _c3 = join(&h, "c3", "s3").await;
        hello(&h, "c3", "c");
        let named = h.rooms().list_named(PARTY);
        let c3 = named.iter().find(|m| m.connection_id == "c3").unwrap();
        assert_eq!(c3.colour, Some(PALETTE[0]));
        assert_eq!(h.member(c3.id).unwrap().nick.as_deref(), Some("c"));
    }
}
