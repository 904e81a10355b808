//! Relay server: TCP accept loop and WebSocket handshake.

use std::io;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;
use crate::relay::RelayState;

/// A relay bound to a local address, ready to accept connections.
pub struct RelayServer {
    listener: TcpListener,
    state: RelayState,
}

impl RelayServer {
    /// Bind to `addr`. Port 0 lets the OS pick a free one.
    pub async fn bind(addr: &str, state: RelayState) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one task per connection.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        match accept_async(stream).await {
                            Ok(ws) => handle_connection(ws, addr, state).await,
                            Err(e) => {
                                tracing::warn!(peer = %addr, error = %e, "websocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "tcp accept error");
                }
            }
        }
    }
}
