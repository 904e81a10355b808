//! End-to-end relay tests over real WebSocket connections: a listener on an
//! OS-assigned port, driven by real signaling clients.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use parlor::client::{RoomClient, RoomEvent, RoomTrackHandler};
use parlor::config::ClientConfig;
use parlor::protocol::{ClientEvent, ServerEvent};
use parlor::relay::RelayState;
use parlor::server::RelayServer;
use parlor::session::NegotiationState;
use parlor::signaling::SignalingClient;

async fn start_relay() -> (String, RelayState) {
    let state = RelayState::new();
    let server = RelayServer::bind("127.0.0.1:0", state.clone())
        .await
        .expect("bind relay");
    let url = format!("ws://{}", server.local_addr().expect("local addr"));
    tokio::spawn(server.run());
    (url, state)
}

async fn recv(client: &mut SignalingClient) -> ServerEvent {
    timeout(Duration::from_secs(5), client.recv())
        .await
        .expect("timed out waiting for event")
        .expect("connection closed")
}

async fn join(client: &SignalingClient, room: &str) {
    client
        .send(ClientEvent::JoinRoom {
            room_id: room.into(),
        })
        .await
        .expect("send join");
}

#[tokio::test]
async fn newcomer_is_introduced_to_the_room() {
    let (url, _state) = start_relay().await;

    let mut alice = SignalingClient::connect(&url).await.expect("connect");
    join(&alice, "abc123").await;
    let ServerEvent::RoomInfo {
        room_id,
        participants,
    } = recv(&mut alice).await
    else {
        panic!("expected room-info");
    };
    assert_eq!(room_id, "abc123");
    assert!(participants.is_empty());

    let mut bob = SignalingClient::connect(&url).await.expect("connect");
    join(&bob, "abc123").await;
    let ServerEvent::RoomInfo { participants, .. } = recv(&mut bob).await else {
        panic!("expected room-info");
    };
    assert_eq!(participants.len(), 1);
    let alice_id = participants[0].clone();

    let ServerEvent::UserJoined { participant_id } = recv(&mut alice).await else {
        panic!("expected user-joined");
    };
    assert_ne!(participant_id, alice_id);
}

#[tokio::test]
async fn offer_travels_unmodified() {
    let (url, _state) = start_relay().await;

    let mut alice = SignalingClient::connect(&url).await.expect("connect");
    join(&alice, "abc123").await;
    recv(&mut alice).await; // room-info

    let mut bob = SignalingClient::connect(&url).await.expect("connect");
    join(&bob, "abc123").await;
    let ServerEvent::RoomInfo { participants, .. } = recv(&mut bob).await else {
        panic!("expected room-info");
    };
    let alice_id = participants[0].clone();
    let ServerEvent::UserJoined {
        participant_id: bob_id,
    } = recv(&mut alice).await
    else {
        panic!("expected user-joined");
    };

    let payload = json!({
        "type": "offer",
        "sdp": "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\n",
    });
    alice
        .send(ClientEvent::Offer {
            to: bob_id,
            offer: payload.clone(),
        })
        .await
        .expect("send offer");

    let ServerEvent::Offer { from, offer } = recv(&mut bob).await else {
        panic!("expected offer");
    };
    assert_eq!(from, alice_id);
    assert_eq!(offer, payload);
}

#[tokio::test]
async fn disconnect_cleans_up_and_empty_rooms_vanish() {
    let (url, state) = start_relay().await;

    let mut alice = SignalingClient::connect(&url).await.expect("connect");
    join(&alice, "abc123").await;
    recv(&mut alice).await; // room-info

    let mut bob = SignalingClient::connect(&url).await.expect("connect");
    join(&bob, "abc123").await;
    recv(&mut bob).await; // room-info
    recv(&mut alice).await; // user-joined

    drop(bob);

    let ServerEvent::UserLeft { .. } = recv(&mut alice).await else {
        panic!("expected user-left");
    };
    assert_eq!(state.participants_of("abc123").await.len(), 1);

    drop(alice);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while state.room_count().await != 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "room not removed after last member left"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(state.participants_of("abc123").await.is_empty());
}

#[tokio::test]
async fn malformed_frames_do_not_kill_the_connection() {
    let (url, _state) = start_relay().await;

    let mut alice = SignalingClient::connect(&url).await.expect("connect");
    join(&alice, "abc123").await;
    recv(&mut alice).await; // room-info

    // an empty room id is the one join the relay rejects
    join(&alice, "").await;
    let ServerEvent::Error { message } = recv(&mut alice).await else {
        panic!("expected error");
    };
    assert!(message.contains("room id"));

    // the connection is still usable afterwards
    join(&alice, "xyz789").await;
    let ServerEvent::RoomInfo { room_id, .. } = recv(&mut alice).await else {
        panic!("expected room-info");
    };
    assert_eq!(room_id, "xyz789");
}

#[tokio::test]
async fn connect_with_retry_survives_a_slow_relay() {
    // learn a free port, then come up on it only after the first attempt
    // has already failed
    let probe = RelayServer::bind("127.0.0.1:0", RelayState::new())
        .await
        .expect("bind probe");
    let addr = probe.local_addr().expect("local addr");
    drop(probe);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let server = RelayServer::bind(&addr.to_string(), RelayState::new())
            .await
            .expect("rebind");
        server.run().await;
    });

    let url = format!("ws://{addr}");
    let mut client = timeout(Duration::from_secs(10), SignalingClient::connect_with_retry(&url))
        .await
        .expect("timed out")
        .expect("connect with retry");

    join(&client, "abc123").await;
    let ServerEvent::RoomInfo { room_id, .. } = recv(&mut client).await else {
        panic!("expected room-info");
    };
    assert_eq!(room_id, "abc123");
}

fn audio_track(label: &str) -> Arc<dyn TrackLocal + Send + Sync> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            ..Default::default()
        },
        "audio".to_owned(),
        label.to_owned(),
    ))
}

#[tokio::test]
async fn two_clients_negotiate_through_the_relay() {
    let (url, _state) = start_relay().await;
    let config = ClientConfig {
        relay_url: url,
        ice_servers: Vec::new(),
    };
    let no_tracks: RoomTrackHandler = Arc::new(|_, _| {});

    let mut alice = RoomClient::connect(config.clone(), no_tracks.clone())
        .await
        .expect("connect");
    alice.set_local_tracks(vec![audio_track("alice")]);
    alice.join("qrst42").await.expect("join");
    let RoomEvent::Joined { participants, .. } = timeout(
        Duration::from_secs(5),
        alice.process_next(),
    )
    .await
    .expect("timed out")
    .expect("process")
    .expect("connection closed")
    else {
        panic!("expected joined event");
    };
    assert!(participants.is_empty());

    let mut bob = RoomClient::connect(config, no_tracks).await.expect("connect");
    bob.set_local_tracks(vec![audio_track("bob")]);
    bob.join("qrst42").await.expect("join");
    let RoomEvent::Joined { participants, .. } = timeout(
        Duration::from_secs(5),
        bob.process_next(),
    )
    .await
    .expect("timed out")
    .expect("process")
    .expect("connection closed")
    else {
        panic!("expected joined event");
    };
    let alice_id = participants[0].clone();

    // alice learns of bob and sends the offer
    let RoomEvent::PeerJoined { peer_id: bob_id } = timeout(
        Duration::from_secs(5),
        alice.process_next(),
    )
    .await
    .expect("timed out")
    .expect("process")
    .expect("connection closed")
    else {
        panic!("expected peer-joined on the initiator");
    };

    // bob answers the incoming offer
    let RoomEvent::PeerJoined { peer_id } = timeout(
        Duration::from_secs(5),
        bob.process_next(),
    )
    .await
    .expect("timed out")
    .expect("process")
    .expect("connection closed")
    else {
        panic!("expected peer-joined on the responder");
    };
    assert_eq!(peer_id, alice_id);

    // drive alice long enough to absorb the answer and any candidates
    let _ = timeout(Duration::from_millis(750), alice.process_next()).await;

    let alice_session = alice.session(&bob_id).expect("initiator session");
    assert_eq!(alice_session.remote_peer_id(), bob_id);
    assert_eq!(alice_session.state().await, NegotiationState::Connected);

    let bob_session = bob.session(&alice_id).expect("responder session");
    assert!(matches!(
        bob_session.state().await,
        NegotiationState::HaveRemoteOffer | NegotiationState::Connected
    ));

    alice.leave().await;
    bob.leave().await;
}
