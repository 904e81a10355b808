//! Client-side configuration.

/// Settings for the signaling connection and the negotiation engine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the relay.
    pub relay_url: String,

    /// STUN/TURN URLs handed to the negotiation engine. An empty list keeps
    /// candidate gathering local, which is what the tests run with.
    pub ice_servers: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8080".to_string(),
            ice_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
        }
    }
}
