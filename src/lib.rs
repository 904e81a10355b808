//! Room-based WebRTC signaling: an in-memory room directory, a WebSocket
//! relay that forwards negotiation messages between participants, and the
//! client-side machinery that consumes them.
//!
//! The relay never inspects media or session descriptions. It introduces
//! peers sharing a room and forwards their offer/answer/candidate exchange
//! verbatim; the peers then negotiate a direct media path between
//! themselves.

pub mod client;
pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;
pub mod signaling;

pub use client::{generate_room_id, RoomClient, RoomEvent, RoomTrackHandler};
pub use config::ClientConfig;
pub use directory::RoomDirectory;
pub use error::{Error, NegotiationError, Result};
pub use protocol::{ClientEvent, ServerEvent};
pub use relay::{RelayState, SessionHandler};
pub use server::RelayServer;
pub use session::{NegotiationState, PeerSession};
pub use signaling::{SignalingClient, SignalingSender};
