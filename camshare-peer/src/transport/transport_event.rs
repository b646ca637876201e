use crate::error::TransportError;
use crate::media::{MediaStream, MediaTrack};
use crate::transport::MediaCall;
use camshare_core::{CallId, PeerId};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events a peer handle emits about its registration with the signaling
/// service and about inbound calls.
pub enum TransportEvent {
    /// Registered (or re-registered) under this address.
    Open(PeerId),

    Error(TransportError),

    /// The signaling service dropped the registration. Established calls
    /// keep running.
    Disconnected,

    /// The handle was destroyed.
    Closed,

    /// Someone dialed this address.
    Call(Arc<dyn MediaCall>),
}

/// Events about one call.
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// The remote side's stream arrived.
    Stream(MediaStream),

    /// A single remote track arrived, together with the streams it belongs
    /// to. Depending on negotiation either this or `Stream` (or both) fires.
    Track {
        track: MediaTrack,
        streams: Vec<MediaStream>,
    },

    Closed,

    Error(TransportError),
}

/// Where a call reports its events, tagged with the call they belong to.
pub type CallEventSender = mpsc::UnboundedSender<(CallId, CallEvent)>;
