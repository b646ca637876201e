use crate::error::TransportError;
use crate::media::MediaStream;
use crate::transport::{CallEventSender, TransportEvent};
use async_trait::async_trait;
use camshare_core::{CallId, PeerId};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Entry point to the peer-connection library and its signaling service.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Asks for a registration, under `desired` when given or under a
    /// transport-assigned address otherwise.
    ///
    /// The outcome arrives on `events`: [`TransportEvent::Open`] on success,
    /// [`TransportEvent::Error`] when the address is taken or the service is
    /// unreachable. An `Err` here means no handle could be created at all.
    async fn open(
        &self,
        desired: Option<PeerId>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerHandle>, TransportError>;
}

/// One registration with the signaling service.
#[async_trait]
pub trait PeerHandle: Send + Sync {
    /// The registered address, once known.
    fn peer_id(&self) -> Option<PeerId>;

    /// Re-registers under the same address after a server-side disconnect.
    /// Success is reported as a new [`TransportEvent::Open`].
    async fn reconnect(&self) -> Result<(), TransportError>;

    /// Dials `remote`, sending `local` as this side's media.
    ///
    /// `events` is bound to the call before dialing starts; the transport may
    /// report events through it before this method returns.
    async fn call(
        &self,
        remote: &PeerId,
        local: MediaStream,
        events: CallEventSender,
    ) -> Result<Arc<dyn MediaCall>, TransportError>;

    /// Closes every call held by this handle and releases the registration.
    /// Calling it twice is harmless.
    async fn destroy(&self);

    fn is_destroyed(&self) -> bool;
}

/// One media connection between two handles.
pub trait MediaCall: Send + Sync {
    fn id(&self) -> CallId;

    fn remote_peer(&self) -> &PeerId;

    /// Accepts an inbound call with `local` as the answer stream.
    ///
    /// `events` is bound before the answer is sent: a close or error that the
    /// transport raises synchronously inside this method is delivered through
    /// it rather than lost. Answering a call that already closed fails with
    /// [`crate::TransportErrorKind::CallClosed`].
    fn answer(&self, local: MediaStream, events: CallEventSender) -> Result<(), TransportError>;

    /// Binds `events` to an inbound call that is not answered yet, so a hang-up
    /// from the caller is still reported. Answering later rebinds the same
    /// channel; watching an answered call does nothing.
    fn watch(&self, events: CallEventSender);

    /// Hangs up. Both ends receive [`crate::CallEvent::Closed`]; repeated
    /// calls do nothing.
    fn close(&self);

    /// Answered and not closed.
    fn is_open(&self) -> bool;

    /// Either side hung up.
    fn is_closed(&self) -> bool;
}
