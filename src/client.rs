//! Room client: joins a room through the relay and drives one negotiation
//! session per remote peer.
//!
//! Whoever is already in the room initiates: a `user-joined` announcement
//! makes the existing member offer, and the newcomer answers when that
//! offer arrives. Candidates trickle both ways afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use serde_json::Value;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::session::{LocalCandidateHandler, PeerSession, RemoteTrackHandler};
use crate::signaling::{SignalingClient, SignalingSender};

const ROOM_ID_LEN: usize = 7;
const ROOM_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate an opaque room token.
pub fn generate_room_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_ID_LEN)
        .map(|_| ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())] as char)
        .collect()
}

/// Callback for inbound media, keyed by the remote peer it came from.
pub type RoomTrackHandler = Arc<dyn Fn(String, Arc<TrackRemote>) + Send + Sync>;

/// Room-level happenings surfaced to the caller.
#[derive(Debug)]
pub enum RoomEvent {
    /// We are in; these participants were already there.
    Joined {
        room_id: String,
        participants: Vec<String>,
    },
    /// A peer relationship began (either side of the offer).
    PeerJoined { peer_id: String },
    /// A peer left and its session was closed.
    PeerLeft { peer_id: String },
    /// The relay rejected a request.
    Error { message: String },
}

/// Client-side lifecycle glue between the signaling channel and the
/// per-peer negotiation sessions.
pub struct RoomClient {
    config: ClientConfig,
    signaling: SignalingClient,
    sender: SignalingSender,
    local_tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
    sessions: HashMap<String, Arc<PeerSession>>,
    on_remote_track: RoomTrackHandler,
}

impl RoomClient {
    /// Connect to the relay named in `config`.
    pub async fn connect(config: ClientConfig, on_remote_track: RoomTrackHandler) -> Result<Self> {
        let signaling = SignalingClient::connect(&config.relay_url).await?;
        let sender = signaling.sender();
        Ok(Self {
            config,
            signaling,
            sender,
            local_tracks: Vec::new(),
            sessions: HashMap::new(),
            on_remote_track,
        })
    }

    /// Shared local tracks attached to every session created from here on.
    pub fn set_local_tracks(&mut self, tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>) {
        self.local_tracks = tracks;
    }

    /// Ask the relay to put us in a room (creating it if needed).
    pub async fn join(&self, room_id: &str) -> Result<()> {
        self.signaling
            .send(ClientEvent::JoinRoom {
                room_id: room_id.to_string(),
            })
            .await
    }

    /// Session bound to a remote peer, if one exists.
    pub fn session(&self, peer_id: &str) -> Option<&Arc<PeerSession>> {
        self.sessions.get(peer_id)
    }

    /// Consume relayed events until one is worth surfacing. Descriptions
    /// and candidates are absorbed into their sessions along the way.
    /// Returns `None` once the signaling connection is gone.
    pub async fn process_next(&mut self) -> Result<Option<RoomEvent>> {
        loop {
            let Some(event) = self.signaling.recv().await else {
                return Ok(None);
            };
            match event {
                ServerEvent::RoomInfo {
                    room_id,
                    participants,
                } => {
                    return Ok(Some(RoomEvent::Joined {
                        room_id,
                        participants,
                    }));
                }
                ServerEvent::UserJoined { participant_id } => {
                    self.initiate(&participant_id).await?;
                    return Ok(Some(RoomEvent::PeerJoined {
                        peer_id: participant_id,
                    }));
                }
                ServerEvent::Offer { from, offer } => {
                    if self.respond(&from, offer).await? {
                        return Ok(Some(RoomEvent::PeerJoined { peer_id: from }));
                    }
                }
                ServerEvent::Answer { from, answer } => {
                    self.complete(&from, answer).await?;
                }
                ServerEvent::IceCandidate { from, candidate } => {
                    self.candidate(&from, candidate).await?;
                }
                ServerEvent::UserLeft { participant_id } => {
                    if let Some(session) = self.sessions.remove(&participant_id) {
                        session.close().await;
                    }
                    return Ok(Some(RoomEvent::PeerLeft {
                        peer_id: participant_id,
                    }));
                }
                ServerEvent::Error { message } => {
                    return Ok(Some(RoomEvent::Error { message }));
                }
            }
        }
    }

    /// Close every session. The signaling connection goes down with the
    /// client when it is dropped.
    pub async fn leave(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.close().await;
        }
    }

    /// A newcomer appeared: we are the initiator.
    async fn initiate(&mut self, peer_id: &str) -> Result<()> {
        let session = self.ensure_session(peer_id).await?;
        let offer = session.create_offer().await?;
        let offer = serde_json::to_value(&offer)?;
        self.sender
            .send(ClientEvent::Offer {
                to: peer_id.to_string(),
                offer,
            })
            .await
    }

    /// An offer arrived: we are the responder. Returns whether this was a
    /// previously unseen peer.
    async fn respond(&mut self, peer_id: &str, offer: Value) -> Result<bool> {
        let created = !self.sessions.contains_key(peer_id);
        let session = self.ensure_session(peer_id).await?;
        let offer: RTCSessionDescription = serde_json::from_value(offer)?;
        let answer = session.accept_offer(offer).await?;
        let answer = serde_json::to_value(&answer)?;
        self.sender
            .send(ClientEvent::Answer {
                to: peer_id.to_string(),
                answer,
            })
            .await?;
        Ok(created)
    }

    async fn complete(&mut self, peer_id: &str, answer: Value) -> Result<()> {
        let Some(session) = self.sessions.get(peer_id) else {
            tracing::debug!(peer = %peer_id, "answer for unknown session dropped");
            return Ok(());
        };
        let answer: RTCSessionDescription = serde_json::from_value(answer)?;
        session.accept_answer(answer).await?;
        Ok(())
    }

    async fn candidate(&mut self, peer_id: &str, candidate: Value) -> Result<()> {
        let Some(session) = self.sessions.get(peer_id) else {
            tracing::debug!(peer = %peer_id, "candidate for unknown session dropped");
            return Ok(());
        };
        let candidate: RTCIceCandidateInit = serde_json::from_value(candidate)?;
        session.add_remote_candidate(candidate).await?;
        Ok(())
    }

    async fn ensure_session(&mut self, peer_id: &str) -> Result<Arc<PeerSession>> {
        if let Some(session) = self.sessions.get(peer_id) {
            return Ok(session.clone());
        }

        let sender = self.sender.clone();
        let to = peer_id.to_string();
        let on_candidate: LocalCandidateHandler = Arc::new(move |init: RTCIceCandidateInit| {
            let sender = sender.clone();
            let to = to.clone();
            tokio::spawn(async move {
                let candidate = match serde_json::to_value(&init) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(error = %e, "candidate failed to encode");
                        return;
                    }
                };
                let event = ClientEvent::IceCandidate {
                    to: to.clone(),
                    candidate,
                };
                if let Err(e) = sender.send(event).await {
                    tracing::debug!(peer = %to, error = %e, "candidate send failed");
                }
            });
        });

        let track_handler = self.on_remote_track.clone();
        let peer = peer_id.to_string();
        let on_track: RemoteTrackHandler =
            Arc::new(move |track| track_handler(peer.clone(), track));

        let session = Arc::new(
            PeerSession::new(peer_id, &self.config, on_track, on_candidate).await?,
        );
        if !self.local_tracks.is_empty() {
            session.attach_local_tracks(&self.local_tracks).await?;
        }
        self.sessions.insert(peer_id.to_string(), session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_ids_are_short_and_url_safe() {
        let id = generate_room_id();
        assert_eq!(id.len(), ROOM_ID_LEN);
        assert!(id.bytes().all(|b| ROOM_ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn room_ids_are_not_constant() {
        let a = generate_room_id();
        let b = generate_room_id();
        // collisions are tolerated by the protocol, but back-to-back
        // generation repeating would mean the generator is broken
        assert!(a != b || generate_room_id() != a);
    }
}
