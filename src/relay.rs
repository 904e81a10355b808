//! Relay side of the signaling protocol: shared state and the
//! per-connection session handler.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::directory::RoomDirectory;
use crate::protocol::{ClientEvent, ServerEvent};

/// Outbound queue depth per connection.
const OUTBOUND_BUFFER: usize = 256;

/// Shared relay state: the room directory plus the send handle of every
/// live connection. Both sit behind one lock so membership changes and the
/// connection registry mutate together; send handles are cloned out and all
/// channel sends happen after the lock is released.
#[derive(Clone)]
pub struct RelayState {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    directory: RoomDirectory,
    peers: HashMap<String, mpsc::Sender<ServerEvent>>,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.inner.lock().await.directory.room_count()
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.peers.len()
    }

    /// Current members of a room; empty when the room does not exist.
    pub async fn participants_of(&self, room_id: &str) -> Vec<String> {
        self.inner.lock().await.directory.participants_of(room_id)
    }
}

/// One handler per live connection. Owns the connection's participant
/// identity for the connection's lifetime and routes its inbound events.
///
/// The lifecycle is linear: events are processed until the transport goes
/// away, then [`handle_disconnect`] runs exactly once and the handler is
/// closed for good. Events arriving after that are ignored.
///
/// [`handle_disconnect`]: SessionHandler::handle_disconnect
pub struct SessionHandler {
    state: RelayState,
    participant_id: String,
    outbound: mpsc::Sender<ServerEvent>,
    closed: bool,
}

impl SessionHandler {
    /// Register a new connection under a fresh participant identity and
    /// hand back its handler plus the receiving end of its outbound queue.
    pub async fn register(
        state: RelayState,
        participant_id: String,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        state
            .inner
            .lock()
            .await
            .peers
            .insert(participant_id.clone(), tx.clone());
        (
            Self {
                state,
                participant_id,
                outbound: tx,
                closed: false,
            },
            rx,
        )
    }

    /// Process one inbound event to completion.
    pub async fn handle_event(&mut self, event: ClientEvent) {
        if self.closed {
            tracing::debug!(participant = %self.participant_id, "event after close ignored");
            return;
        }
        match event {
            ClientEvent::JoinRoom { room_id } => self.join_room(room_id).await,
            ClientEvent::Offer { to, offer } => {
                let from = self.participant_id.clone();
                self.forward(&to, ServerEvent::Offer { from, offer }).await;
            }
            ClientEvent::Answer { to, answer } => {
                let from = self.participant_id.clone();
                self.forward(&to, ServerEvent::Answer { from, answer }).await;
            }
            ClientEvent::IceCandidate { to, candidate } => {
                let from = self.participant_id.clone();
                self.forward(&to, ServerEvent::IceCandidate { from, candidate })
                    .await;
            }
        }
    }

    /// Join a room: record the membership, announce ourselves to everyone
    /// already there, and report the room's prior members back to us.
    async fn join_room(&self, room_id: String) {
        if room_id.trim().is_empty() {
            self.send_self(ServerEvent::Error {
                message: "room id must not be empty".into(),
            })
            .await;
            return;
        }

        let (others, targets) = {
            let mut inner = self.state.inner.lock().await;
            inner.directory.add_participant(&room_id, &self.participant_id);
            let others: Vec<String> = inner
                .directory
                .participants_of(&room_id)
                .into_iter()
                .filter(|id| id != &self.participant_id)
                .collect();
            let targets: Vec<mpsc::Sender<ServerEvent>> = others
                .iter()
                .filter_map(|id| inner.peers.get(id).cloned())
                .collect();
            (others, targets)
        };

        tracing::info!(
            participant = %self.participant_id,
            room = %room_id,
            members = others.len() + 1,
            "joined room"
        );

        for tx in targets {
            let _ = tx
                .send(ServerEvent::UserJoined {
                    participant_id: self.participant_id.clone(),
                })
                .await;
        }
        self.send_self(ServerEvent::RoomInfo {
            room_id,
            participants: others,
        })
        .await;
    }

    /// Forward a relayed event to a single target. Unroutable targets are
    /// dropped without feedback to the sender.
    async fn forward(&self, to: &str, event: ServerEvent) {
        let target = self.state.inner.lock().await.peers.get(to).cloned();
        match target {
            Some(tx) => {
                let _ = tx.send(event).await;
            }
            None => {
                tracing::debug!(
                    participant = %self.participant_id,
                    target = %to,
                    "dropping event for unknown target"
                );
            }
        }
    }

    async fn send_self(&self, event: ServerEvent) {
        let _ = self.outbound.send(event).await;
    }

    /// Disconnect cleanup: leave every room, tell the remaining members,
    /// and delete rooms this departure emptied. Runs once; repeated calls
    /// and later events are no-ops.
    pub async fn handle_disconnect(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut notify: Vec<mpsc::Sender<ServerEvent>> = Vec::new();
        {
            let mut inner = self.state.inner.lock().await;
            inner.peers.remove(&self.participant_id);
            for room_id in inner.directory.rooms_of(&self.participant_id) {
                inner
                    .directory
                    .remove_participant(&room_id, &self.participant_id);
                let remaining = inner.directory.participants_of(&room_id);
                if remaining.is_empty() {
                    inner.directory.remove_room(&room_id);
                    tracing::info!(room = %room_id, "room emptied, removed");
                } else {
                    notify.extend(remaining.iter().filter_map(|id| inner.peers.get(id).cloned()));
                }
            }
        }

        for tx in notify {
            let _ = tx
                .send(ServerEvent::UserLeft {
                    participant_id: self.participant_id.clone(),
                })
                .await;
        }
        tracing::info!(participant = %self.participant_id, "disconnected");
    }
}
