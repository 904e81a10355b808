//! Wire protocol: tagged JSON events exchanged over the signaling channel.
//!
//! Session descriptions and ICE candidates ride through as opaque values;
//! the relay forwards them verbatim and never looks inside.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join (and implicitly create) a room.
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },

    /// Session description offer for a single target participant.
    Offer { to: String, offer: Value },

    /// Session description answer for a single target participant.
    Answer { to: String, answer: Value },

    /// Discovered network path for a single target participant.
    IceCandidate { to: String, candidate: Value },
}

/// Events the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A new participant joined a room you are in.
    #[serde(rename_all = "camelCase")]
    UserJoined { participant_id: String },

    /// Reply to a join: who was already in the room (the joiner excluded).
    #[serde(rename_all = "camelCase")]
    RoomInfo {
        room_id: String,
        participants: Vec<String>,
    },

    /// Relayed offer, `from` rewritten to the sender's identity.
    Offer { from: String, offer: Value },

    /// Relayed answer.
    Answer { from: String, answer: Value },

    /// Relayed ICE candidate.
    IceCandidate { from: String, candidate: Value },

    /// A participant left a room you are in.
    #[serde(rename_all = "camelCase")]
    UserLeft { participant_id: String },

    /// The relay rejected a request.
    Error { message: String },
}
