//! Per-connection transport pump: decode frames at the boundary, feed the
//! session handler, and run disconnect cleanup when the socket goes away.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use crate::protocol::ClientEvent;
use crate::relay::{RelayState, SessionHandler};

/// Drive a single WebSocket connection to completion.
///
/// The connection gets a fresh participant identity; a reconnect is a new
/// participant. Inbound frames are processed one at a time, so for this
/// connection every event completes before the next is read.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    state: RelayState,
) {
    let (mut sink, mut stream) = ws.split();

    let participant_id = Uuid::new_v4().to_string();
    let (mut handler, mut outbound) =
        SessionHandler::register(state, participant_id.clone()).await;

    tracing::info!(peer = %addr, participant = %participant_id, "connection open");

    loop {
        tokio::select! {
            // Queued outbound events to this client's socket.
            Some(event) = outbound.recv() => {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, "outbound event failed to encode");
                        continue;
                    }
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }

            // Frames from this client's socket.
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => handler.handle_event(event).await,
                            Err(e) => {
                                tracing::warn!(
                                    participant = %participant_id,
                                    error = %e,
                                    "malformed frame dropped"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "websocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    handler.handle_disconnect().await;
    tracing::info!(peer = %addr, participant = %participant_id, "connection closed");
}
