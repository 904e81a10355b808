//! Client end of the signaling channel.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};
use crate::protocol::{ClientEvent, ServerEvent};

const CHANNEL_CAPACITY: usize = 100;
const MAX_CONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY_MS: u64 = 1000;

/// Cloneable handle for emitting events outside the client itself, e.g.
/// from negotiation engine callbacks.
#[derive(Clone)]
pub struct SignalingSender {
    tx: mpsc::Sender<ClientEvent>,
}

impl SignalingSender {
    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|e| Error::Signaling(format!("send failed: {e}")))
    }
}

/// WebSocket connection to the relay, split into channel-backed pumps.
///
/// Dropping the client (and every [`SignalingSender`] cloned from it) sends
/// a close frame, which is what triggers the relay's disconnect cleanup.
pub struct SignalingClient {
    tx: mpsc::Sender<ClientEvent>,
    rx: mpsc::Receiver<ServerEvent>,
}

impl SignalingClient {
    /// Connect to the relay and spawn the reader/writer pumps.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        let (incoming_tx, incoming_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<ClientEvent>(CHANNEL_CAPACITY);

        // Outgoing events to the socket.
        tokio::spawn(async move {
            while let Some(event) = outgoing_rx.recv().await {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, "outbound event failed to encode");
                        continue;
                    }
                };
                if write.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            // every sender is gone; tell the relay we are leaving
            let _ = write.send(Message::Close(None)).await;
        });

        // Inbound frames, validated here at the boundary.
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        if incoming_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "unrecognized frame dropped");
                    }
                }
            }
        });

        Ok(Self {
            tx: outgoing_tx,
            rx: incoming_rx,
        })
    }

    /// Connect with a bounded retry loop. This is caller-side policy; the
    /// relay protocol itself never retries anything.
    pub async fn connect_with_retry(url: &str) -> Result<Self> {
        let mut attempts = 0;
        loop {
            match Self::connect(url).await {
                Ok(client) => return Ok(client),
                Err(e) => {
                    attempts += 1;
                    if attempts >= MAX_CONNECT_ATTEMPTS {
                        return Err(e);
                    }
                    tracing::warn!(attempt = attempts, error = %e, "connect failed, retrying");
                    sleep(Duration::from_millis(RECONNECT_DELAY_MS)).await;
                }
            }
        }
    }

    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|e| Error::Signaling(format!("send failed: {e}")))
    }

    /// Next event from the relay; `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }

    /// Handle for emitting events from engine callbacks.
    pub fn sender(&self) -> SignalingSender {
        SignalingSender {
            tx: self.tx.clone(),
        }
    }
}
