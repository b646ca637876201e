mod loopback;
mod peer_transport;
mod transport_config;
mod transport_event;
mod webrtc;

pub use loopback::{LoopbackNetwork, StreamDelivery};
pub use peer_transport::{MediaCall, PeerHandle, PeerTransport};
pub use transport_config::TransportConfig;
pub use transport_event::{CallEvent, CallEventSender, TransportEvent};
pub use webrtc::WebRtcTransport;
