//! Library error types.

use thiserror::Error;

use crate::session::NegotiationState;

/// Errors surfaced by the signaling transport and room client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("wire format error: {0}")]
    Wire(#[from] serde_json::Error),

    #[error("signaling channel error: {0}")]
    Signaling(String),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
}

/// Typed failures from the peer negotiation state machine.
///
/// The session stays in its last valid state after any of these; nothing is
/// retried automatically, the caller decides whether to tear down and start
/// over.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("negotiation engine setup failed: {0}")]
    Engine(#[source] webrtc::Error),

    #[error("failed to attach local track: {0}")]
    AttachTrack(#[source] webrtc::Error),

    #[error("failed to create offer: {0}")]
    CreateOffer(#[source] webrtc::Error),

    #[error("failed to create answer: {0}")]
    CreateAnswer(#[source] webrtc::Error),

    #[error("remote description rejected: {0}")]
    RemoteDescription(#[source] webrtc::Error),

    #[error("ICE candidate rejected: {0}")]
    Candidate(#[source] webrtc::Error),

    #[error("{op} requires the {expected} state, session is {actual}")]
    InvalidState {
        op: &'static str,
        expected: NegotiationState,
        actual: NegotiationState,
    },

    #[error("session is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
