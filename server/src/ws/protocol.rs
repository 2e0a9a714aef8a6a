//! JSON messages exchanged over a party WebSocket.
//! Every frame is a text frame carrying an object with an `action` field.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::room::membership::Colour;

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action")]
pub enum ClientMessage {
    #[serde(rename = "hello")]
    Hello { nick: String },

    /// Forward `message` to the connection named by `target`.
    #[serde(rename = "relay")]
    Relay {
        target: String,
        message: serde_json::Value,
    },

    #[serde(rename = "addToQueue")]
    AddToQueue { song: i64 },

    #[serde(rename = "removeFromQueue")]
    RemoveFromQueue { song: i64 },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A named member as it appears in a `member_list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberSummary {
    pub nick: String,
    pub colour: Colour,
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after accept, carrying the connection's own id.
    Hello { channel: String },

    /// Everyone already named in the party, keyed by connection id.
    MemberList {
        members: BTreeMap<String, MemberSummary>,
    },

    NewMember {
        channel: String,
        nick: String,
        colour: Colour,
    },

    MemberLeft { channel: String, nick: String },

    Relay {
        origin: String,
        message: serde_json::Value,
    },

    Goodbye { message: String },

    Playlist { playlist: Vec<i64> },
}

/// `goodbye` reason sent when a party is at capacity.
pub const ROOM_FULL: &str = "room_full";

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Encode as a WebSocket text frame.
    pub fn to_frame(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::Text(self.to_json()?.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::membership::PALETTE;
    use serde_json::json;

    #[test]
    fn parses_client_actions() {
        assert_eq!(
            ClientMessage::parse(r#"{"action":"hello","nick":"Rarity"}"#).unwrap(),
            ClientMessage::Hello {
                nick: "Rarity".to_string()
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"action":"relay","target":"c2","message":{"action":"ping","time":5}}"#)
                .unwrap(),
            ClientMessage::Relay {
                target: "c2".to_string(),
                message: json!({"action": "ping", "time": 5}),
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"action":"addToQueue","song":12}"#).unwrap(),
            ClientMessage::AddToQueue { song: 12 }
        );
    }

    #[test]
    fn rejects_unknown_or_malformed() {
        assert!(ClientMessage::parse(r#"{"action":"dance"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"action":"hello"}"#).is_err());
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn server_messages_use_action_tag() {
        let mut members = BTreeMap::new();
        members.insert(
            "c1".to_string(),
            MemberSummary {
                nick: "Rarity".to_string(),
                colour: PALETTE[0],
            },
        );
        let encoded: serde_json::Value =
            serde_json::from_str(&ServerMessage::MemberList { members }.to_json().unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({"action": "member_list", "members": {"c1": {"nick": "Rarity", "colour": "#058fbe"}}})
        );

        let encoded: serde_json::Value = serde_json::from_str(
            &ServerMessage::MemberLeft {
                channel: "c1".to_string(),
                nick: "Rarity".to_string(),
            }
            .to_json()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(encoded, json!({"action": "member_left", "channel": "c1", "nick": "Rarity"}));

        let encoded: serde_json::Value = serde_json::from_str(
            &ServerMessage::Goodbye {
                message: ROOM_FULL.to_string(),
            }
            .to_json()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(encoded, json!({"action": "goodbye", "message": "room_full"}));
    }
}
