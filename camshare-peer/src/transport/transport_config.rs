use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings handed to the peer transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// STUN/TURN urls used for every peer connection.
    pub ice_servers: Vec<String>,
    /// Websocket endpoint of the PeerJS-compatible signaling server.
    pub signaling_url: String,
    /// API key the signaling server expects.
    pub signaling_key: String,
    /// How often a keep-alive is sent on the signaling socket.
    #[serde(with = "crate::session::millis")]
    pub heartbeat_interval: Duration,
    /// Transport log verbosity, 0 (quiet) to 3 (everything).
    pub debug: u8,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                "stun:stun.l.google.com:19302".to_owned(),
                "stun:stun1.l.google.com:19302".to_owned(),
                "stun:stun2.l.google.com:19302".to_owned(),
                "stun:stun3.l.google.com:19302".to_owned(),
                "stun:stun4.l.google.com:19302".to_owned(),
            ],
            signaling_url: "wss://0.peerjs.com:443/peerjs".to_owned(),
            signaling_key: "peerjs".to_owned(),
            heartbeat_interval: Duration::from_secs(5),
            debug: 0,
        }
    }
}
