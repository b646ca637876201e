mod peer_connection;
mod signaling_client;
mod signaling_message;
mod webrtc_call;
mod webrtc_transport;

pub use webrtc_transport::WebRtcTransport;
