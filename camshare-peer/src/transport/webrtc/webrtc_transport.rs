use crate::error::{TransportError, TransportErrorKind};
use crate::media::MediaStream;
use crate::transport::webrtc::peer_connection::build_api;
use crate::transport::webrtc::signaling_client::{self, SignalingSender, SocketEvent};
use crate::transport::webrtc::signaling_message::{
    MEDIA_CONNECTION, SignalKind, SignalMessage, signaling_url,
};
use crate::transport::webrtc::webrtc_call::{Direction, WebRtcCall, new_connection_id};
use crate::transport::{
    CallEventSender, MediaCall, PeerHandle, PeerTransport, TransportConfig, TransportEvent,
};
use async_trait::async_trait;
use camshare_core::PeerId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::api::API;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Peer transport over WebRTC, signaled through a PeerJS-compatible server.
///
/// Browsers running the PeerJS client can dial a camera opened here and
/// the other way round. Every peer connection uses the ICE servers from
/// [`TransportConfig`].
#[derive(Clone)]
pub struct WebRtcTransport {
    config: TransportConfig,
    api: Arc<API>,
}

impl WebRtcTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let api = build_api().map_err(|e| {
            TransportError::new(
                TransportErrorKind::Other,
                format!("could not set up the media engine: {e}"),
            )
        })?;
        debug!(
            "WebRTC transport created ({} ICE servers, signaling at {})",
            config.ice_servers.len(),
            config.signaling_url
        );
        Ok(Self {
            config,
            api: Arc::new(api),
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn open(
        &self,
        desired: Option<PeerId>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerHandle>, TransportError> {
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(HandleShared {
            address: desired.unwrap_or_else(PeerId::random),
            config: self.config.clone(),
            api: self.api.clone(),
            events,
            socket_tx,
            signaling: Mutex::new(None),
            calls: DashMap::new(),
            epoch: AtomicU64::new(0),
            opened: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            reported: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        });

        let router = tokio::spawn(route(shared.clone(), socket_rx));
        if let Err(e) = shared.connect().await {
            warn!("Failed to reach the signaling server: {}", e);
            shared.report(e);
        }

        Ok(Arc::new(WebRtcHandle { shared, router }))
    }
}

/// State shared by a handle, its socket router and its calls.
pub(crate) struct HandleShared {
    address: PeerId,
    config: TransportConfig,
    api: Arc<API>,
    events: mpsc::UnboundedSender<TransportEvent>,
    socket_tx: mpsc::UnboundedSender<SocketEvent>,
    signaling: Mutex<Option<SignalingSender>>,
    /// Calls by PeerJS connection id.
    calls: DashMap<String, Arc<WebRtcCall>>,
    epoch: AtomicU64,
    opened: AtomicBool,
    registered: AtomicBool,
    /// An error was already reported for the current socket.
    reported: AtomicBool,
    destroyed: AtomicBool,
}

impl HandleShared {
    pub(crate) fn api(&self) -> &API {
        &self.api
    }

    pub(crate) fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub(crate) fn signal(&self, message: SignalMessage) -> bool {
        lock(&self.signaling)
            .as_ref()
            .is_some_and(|sender| sender.send(message))
    }

    pub(crate) fn forget_call(&self, connection_id: &str) {
        self.calls.remove(connection_id);
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn report(&self, error: TransportError) {
        self.reported.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Error(error));
    }

    /// Opens a fresh socket; frames of older sockets are ignored from now on.
    async fn connect(&self) -> Result<(), TransportError> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.reported.store(false, Ordering::SeqCst);
        *lock(&self.signaling) = None;

        let token = Uuid::new_v4().simple().to_string();
        let url = signaling_url(&self.config, &self.address, &token)?;
        let sender = signaling_client::connect(
            &url,
            epoch,
            self.config.heartbeat_interval,
            self.socket_tx.clone(),
        )
        .await?;

        if self.destroyed.load(Ordering::SeqCst) || self.epoch.load(Ordering::SeqCst) != epoch {
            return Ok(());
        }
        *lock(&self.signaling) = Some(sender);
        Ok(())
    }

    fn calls_with(&self, peer: &PeerId) -> Vec<Arc<WebRtcCall>> {
        self.calls
            .iter()
            .filter(|entry| entry.value().remote_peer() == peer)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn call_for(&self, message: &SignalMessage) -> Option<Arc<WebRtcCall>> {
        let id = message.connection_id()?;
        self.calls.get(id).map(|entry| entry.value().clone())
    }

    fn socket_closed(&self, reason: Option<String>) {
        *lock(&self.signaling) = None;
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        if self.registered.swap(false, Ordering::SeqCst) {
            info!("Lost the signaling server as {}", self.address);
            self.emit(TransportEvent::Disconnected);
        } else if !self.reported.load(Ordering::SeqCst) {
            let reason = reason.unwrap_or_else(|| "connection ended".to_owned());
            self.report(TransportError::new(
                TransportErrorKind::ServerUnavailable,
                format!("signaling server unavailable: {reason}"),
            ));
        }
    }

    async fn handle_frame(self: &Arc<Self>, message: SignalMessage) {
        match message.kind {
            SignalKind::Open => {
                self.opened.store(true, Ordering::SeqCst);
                self.registered.store(true, Ordering::SeqCst);
                info!("Registered with the signaling server as {}", self.address);
                self.emit(TransportEvent::Open(self.address.clone()));
            }
            SignalKind::IdTaken => {
                warn!("Address {} is already registered", self.address);
                self.report(TransportError::new(
                    TransportErrorKind::UnavailableId,
                    format!("ID \"{}\" is taken", self.address),
                ));
            }
            SignalKind::InvalidKey | SignalKind::Error => {
                let text = message.error_text().unwrap_or("signaling server error");
                warn!("Signaling server error: {}", text);
                self.report(TransportError::classify(text));
            }
            SignalKind::Offer => self.on_offer(message).await,
            SignalKind::Answer => {
                let call = self.call_for(&message);
                let sdp = message.payload.and_then(|p| p.sdp);
                match (call, sdp) {
                    (Some(call), Some(sdp)) => call.accept_answer(sdp).await,
                    _ => debug!("Ignoring answer for an unknown call"),
                }
            }
            SignalKind::Candidate => {
                let call = self.call_for(&message);
                let candidate = message.payload.and_then(|p| p.candidate);
                match (call, candidate) {
                    (Some(call), Some(candidate)) => call.add_remote_candidate(candidate).await,
                    _ => debug!("Ignoring candidate for an unknown call"),
                }
            }
            SignalKind::Leave => {
                if let Some(peer) = message.source() {
                    debug!("{} left", peer);
                    for call in self.calls_with(&peer) {
                        call.close();
                    }
                }
            }
            SignalKind::Expire => {
                let Some(peer) = message.source() else { return };
                let err = TransportError::new(
                    TransportErrorKind::PeerUnavailable,
                    format!("could not connect to peer {peer}"),
                );
                for call in self.calls_with(&peer) {
                    call.fail(err.clone());
                }
                self.emit(TransportEvent::Error(err));
            }
            SignalKind::Heartbeat | SignalKind::Unknown => {}
        }
    }

    async fn on_offer(self: &Arc<Self>, message: SignalMessage) {
        let Some(remote) = message.source() else { return };
        let Some(payload) = message.payload else { return };
        if payload.connection_type.as_deref() != Some(MEDIA_CONNECTION) {
            debug!("Ignoring non-media connection from {}", remote);
            return;
        }
        let (Some(connection_id), Some(sdp)) = (payload.connection_id, payload.sdp) else {
            debug!("Ignoring incomplete offer from {}", remote);
            return;
        };

        let call = match WebRtcCall::create(self, remote.clone(), connection_id, Direction::Incoming)
            .await
        {
            Ok(call) => call,
            Err(e) => {
                warn!("Failed to accept call from {}: {}", remote, e);
                return;
            }
        };
        if let Err(e) = call.receive_offer(sdp).await {
            warn!("Unusable offer from {}: {}", remote, e);
            call.close();
            return;
        }

        if self.config.debug > 0 {
            info!("{} is calling {}", remote, self.address);
        }
        self.calls
            .insert(call.connection_id().to_owned(), call.clone());
        self.emit(TransportEvent::Call(call));
    }
}

/// Feeds socket events of the current epoch into the handle.
async fn route(shared: Arc<HandleShared>, mut socket_rx: mpsc::UnboundedReceiver<SocketEvent>) {
    while let Some(event) = socket_rx.recv().await {
        let current = shared.epoch.load(Ordering::SeqCst);
        match event {
            SocketEvent::Frame { epoch, message } if epoch == current => {
                shared.handle_frame(message).await;
            }
            SocketEvent::Closed { epoch, reason } if epoch == current => {
                shared.socket_closed(reason);
            }
            _ => debug!("Dropping event of a replaced signaling socket"),
        }
    }
}

struct WebRtcHandle {
    shared: Arc<HandleShared>,
    router: JoinHandle<()>,
}

#[async_trait]
impl PeerHandle for WebRtcHandle {
    fn peer_id(&self) -> Option<PeerId> {
        self.shared
            .opened
            .load(Ordering::SeqCst)
            .then(|| self.shared.address.clone())
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        if self.is_destroyed() {
            return Err(TransportError::new(
                TransportErrorKind::Other,
                "cannot reconnect a destroyed peer",
            ));
        }
        self.shared.connect().await
    }

    async fn call(
        &self,
        remote: &PeerId,
        local: MediaStream,
        events: CallEventSender,
    ) -> Result<Arc<dyn MediaCall>, TransportError> {
        if self.is_destroyed() {
            return Err(TransportError::new(
                TransportErrorKind::Other,
                "cannot call from a destroyed peer",
            ));
        }
        if !self.shared.registered.load(Ordering::SeqCst) {
            return Err(TransportError::new(
                TransportErrorKind::Network,
                "not connected to the signaling server",
            ));
        }

        let call = WebRtcCall::create(
            &self.shared,
            remote.clone(),
            new_connection_id(),
            Direction::Outgoing,
        )
        .await?;
        call.bind(events);
        self.shared
            .calls
            .insert(call.connection_id().to_owned(), call.clone());

        if self.shared.config.debug > 0 {
            info!("{} dials {}", self.shared.address, remote);
        }
        if let Err(e) = call.send_offer(&local).await {
            warn!("Failed to dial {}: {}", remote, e);
            call.close();
            return Err(e);
        }
        Ok(call)
    }

    async fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let calls: Vec<Arc<WebRtcCall>> = self
            .shared
            .calls
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for call in calls {
            call.close();
        }

        *lock(&self.shared.signaling) = None;
        self.shared.registered.store(false, Ordering::SeqCst);
        self.router.abort();

        info!("Released {}", self.shared.address);
        self.shared.emit(TransportEvent::Closed);
    }

    fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }
}

impl Drop for WebRtcHandle {
    fn drop(&mut self) {
        self.router.abort();
    }
}
