//! Client-side peer negotiation: one session per remote participant,
//! driving the offer/answer/ICE exchange over an `RTCPeerConnection`.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::ClientConfig;
use crate::error::NegotiationError;

/// Lifecycle of a negotiation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    HaveLocalOffer,
    HaveRemoteOffer,
    Connected,
    Closed,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationState::Idle => write!(f, "idle"),
            NegotiationState::HaveLocalOffer => write!(f, "have-local-offer"),
            NegotiationState::HaveRemoteOffer => write!(f, "have-remote-offer"),
            NegotiationState::Connected => write!(f, "connected"),
            NegotiationState::Closed => write!(f, "closed"),
        }
    }
}

/// Callback invoked when the engine surfaces an inbound media track.
pub type RemoteTrackHandler = Arc<dyn Fn(Arc<TrackRemote>) + Send + Sync>;

/// Callback invoked for every locally discovered ICE candidate; the caller
/// forwards each to the remote peer over the signaling channel.
pub type LocalCandidateHandler = Arc<dyn Fn(RTCIceCandidateInit) + Send + Sync>;

struct SessionState {
    phase: NegotiationState,
    remote_description_set: bool,
    pending_candidates: Vec<RTCIceCandidateInit>,
}

/// One negotiation session with one remote participant.
///
/// Local tracks are shared handles; releasing them stays the caller's
/// responsibility once the session ends. All operations serialize on the
/// session's internal lock, so engine callbacks and caller operations for
/// the same peer never interleave; sessions for different peers are
/// independent.
pub struct PeerSession {
    remote_peer_id: String,
    pc: Arc<RTCPeerConnection>,
    state: Arc<Mutex<SessionState>>,
    phase_tx: Arc<watch::Sender<NegotiationState>>,
    phase_rx: watch::Receiver<NegotiationState>,
}

impl PeerSession {
    /// Build the negotiation engine and wire its callbacks.
    ///
    /// Both handlers are registered once, here, and become no-ops after
    /// [`close`](PeerSession::close).
    pub async fn new(
        remote_peer_id: impl Into<String>,
        config: &ClientConfig,
        on_remote_track: RemoteTrackHandler,
        on_local_candidate: LocalCandidateHandler,
    ) -> Result<Self, NegotiationError> {
        let remote_peer_id = remote_peer_id.into();

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(NegotiationError::Engine)?;
        let api = APIBuilder::new().with_media_engine(media_engine).build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(NegotiationError::Engine)?,
        );

        let state = Arc::new(Mutex::new(SessionState {
            phase: NegotiationState::Idle,
            remote_description_set: false,
            pending_candidates: Vec::new(),
        }));
        let (phase_tx, phase_rx) = watch::channel(NegotiationState::Idle);
        let phase_tx = Arc::new(phase_tx);

        // Inbound media.
        {
            let state = state.clone();
            let handler = on_remote_track;
            let peer = remote_peer_id.clone();
            pc.on_track(Box::new(
                move |track: Arc<TrackRemote>,
                      _receiver: Arc<RTCRtpReceiver>,
                      _transceiver: Arc<RTCRtpTransceiver>| {
                    let state = state.clone();
                    let handler = handler.clone();
                    let peer = peer.clone();
                    Box::pin(async move {
                        if state.lock().await.phase == NegotiationState::Closed {
                            return;
                        }
                        tracing::info!(peer = %peer, kind = ?track.kind(), "remote track");
                        handler(track);
                    })
                },
            ));
        }

        // Locally discovered network paths.
        {
            let state = state.clone();
            let handler = on_local_candidate;
            pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let state = state.clone();
                let handler = handler.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else { return };
                    if state.lock().await.phase == NegotiationState::Closed {
                        return;
                    }
                    match candidate.to_json() {
                        Ok(init) => handler(init),
                        Err(e) => {
                            tracing::warn!(error = %e, "candidate serialization failed");
                        }
                    }
                })
            }));
        }

        // The engine's connection state promotes the session to Connected;
        // a responder has no description-pairing step of its own after the
        // answer, so this is its path out of have-remote-offer.
        {
            let state = state.clone();
            let phase_tx = phase_tx.clone();
            let peer = remote_peer_id.clone();
            pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let state = state.clone();
                let phase_tx = phase_tx.clone();
                let peer = peer.clone();
                Box::pin(async move {
                    tracing::debug!(peer = %peer, state = %s, "peer connection state changed");
                    if s == RTCPeerConnectionState::Connected {
                        let mut guard = state.lock().await;
                        if matches!(
                            guard.phase,
                            NegotiationState::HaveLocalOffer | NegotiationState::HaveRemoteOffer
                        ) {
                            guard.phase = NegotiationState::Connected;
                            let _ = phase_tx.send(NegotiationState::Connected);
                        }
                    }
                })
            }));
        }

        Ok(Self {
            remote_peer_id,
            pc,
            state,
            phase_tx,
            phase_rx,
        })
    }

    pub fn remote_peer_id(&self) -> &str {
        &self.remote_peer_id
    }

    /// Current lifecycle phase.
    pub async fn state(&self) -> NegotiationState {
        self.state.lock().await.phase
    }

    /// Watch phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<NegotiationState> {
        self.phase_rx.clone()
    }

    /// Register shared local tracks with the engine. Must happen before the
    /// offer or answer is created.
    pub async fn attach_local_tracks(
        &self,
        tracks: &[Arc<dyn TrackLocal + Send + Sync>],
    ) -> Result<(), NegotiationError> {
        if self.state.lock().await.phase == NegotiationState::Closed {
            return Err(NegotiationError::Closed);
        }
        for track in tracks {
            self.pc
                .add_track(Arc::clone(track))
                .await
                .map_err(NegotiationError::AttachTrack)?;
        }
        Ok(())
    }

    /// Create and apply the local offer. Valid from `Idle`.
    pub async fn create_offer(&self) -> Result<RTCSessionDescription, NegotiationError> {
        let mut guard = self.state.lock().await;
        expect_phase(&guard, "create_offer", NegotiationState::Idle)?;

        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(NegotiationError::CreateOffer)?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(NegotiationError::CreateOffer)?;

        guard.phase = NegotiationState::HaveLocalOffer;
        let _ = self.phase_tx.send(NegotiationState::HaveLocalOffer);
        Ok(offer)
    }

    /// Apply a remote offer and answer it. Valid from `Idle`.
    pub async fn accept_offer(
        &self,
        offer: RTCSessionDescription,
    ) -> Result<RTCSessionDescription, NegotiationError> {
        let mut guard = self.state.lock().await;
        expect_phase(&guard, "accept_offer", NegotiationState::Idle)?;

        self.pc
            .set_remote_description(offer)
            .await
            .map_err(NegotiationError::RemoteDescription)?;
        guard.remote_description_set = true;
        self.flush_pending(&mut guard).await?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(NegotiationError::CreateAnswer)?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(NegotiationError::CreateAnswer)?;

        guard.phase = NegotiationState::HaveRemoteOffer;
        let _ = self.phase_tx.send(NegotiationState::HaveRemoteOffer);
        Ok(answer)
    }

    /// Apply the remote answer to our outstanding offer. Valid from
    /// `HaveLocalOffer`.
    pub async fn accept_answer(
        &self,
        answer: RTCSessionDescription,
    ) -> Result<(), NegotiationError> {
        let mut guard = self.state.lock().await;
        expect_phase(&guard, "accept_answer", NegotiationState::HaveLocalOffer)?;

        self.pc
            .set_remote_description(answer)
            .await
            .map_err(NegotiationError::RemoteDescription)?;
        guard.remote_description_set = true;
        self.flush_pending(&mut guard).await?;

        guard.phase = NegotiationState::Connected;
        let _ = self.phase_tx.send(NegotiationState::Connected);
        Ok(())
    }

    /// Queue or apply a remote ICE candidate.
    ///
    /// The engine rejects candidates applied before the remote description,
    /// so anything arriving early is held back and flushed, in arrival
    /// order, once the description lands.
    pub async fn add_remote_candidate(
        &self,
        candidate: RTCIceCandidateInit,
    ) -> Result<(), NegotiationError> {
        let mut guard = self.state.lock().await;
        if guard.phase == NegotiationState::Closed {
            return Err(NegotiationError::Closed);
        }
        if !guard.remote_description_set {
            guard.pending_candidates.push(candidate);
            return Ok(());
        }
        self.pc
            .add_ice_candidate(candidate)
            .await
            .map_err(NegotiationError::Candidate)
    }

    async fn flush_pending(&self, guard: &mut SessionState) -> Result<(), NegotiationError> {
        for candidate in std::mem::take(&mut guard.pending_candidates) {
            self.pc
                .add_ice_candidate(candidate)
                .await
                .map_err(NegotiationError::Candidate)?;
        }
        Ok(())
    }

    /// Tear the session down: drop queued candidates and close the peer
    /// connection. Idempotent, terminal, and safe to call from a callback.
    pub async fn close(&self) {
        {
            let mut guard = self.state.lock().await;
            if guard.phase == NegotiationState::Closed {
                return;
            }
            guard.phase = NegotiationState::Closed;
            guard.pending_candidates.clear();
        }
        let _ = self.phase_tx.send(NegotiationState::Closed);
        if let Err(e) = self.pc.close().await {
            tracing::debug!(peer = %self.remote_peer_id, error = %e, "peer connection close");
        }
    }
}

fn expect_phase(
    state: &SessionState,
    op: &'static str,
    expected: NegotiationState,
) -> Result<(), NegotiationError> {
    if state.phase == NegotiationState::Closed {
        return Err(NegotiationError::Closed);
    }
    if state.phase != expected {
        return Err(NegotiationError::InvalidState {
            op,
            expected,
            actual: state.phase,
        });
    }
    Ok(())
}
