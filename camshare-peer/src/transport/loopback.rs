use crate::error::{TransportError, TransportErrorKind};
use crate::media::MediaStream;
use crate::transport::{
    CallEvent, CallEventSender, MediaCall, PeerHandle, PeerTransport, TransportConfig,
    TransportEvent,
};
use async_trait::async_trait;
use camshare_core::{CallId, PeerId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How an answered call hands its stream to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamDelivery {
    /// One `CallEvent::Stream`.
    StreamEvent,
    /// One `CallEvent::Track` per track.
    TrackEvent,
    /// Track events followed by the stream event.
    #[default]
    Both,
}

/// In-process signaling service and media path.
///
/// Every handle opened on the same network (or a clone of it) can reach every
/// other one. Calls complete synchronously, which makes event ordering
/// deterministic; the fault-injection methods reproduce the situations a real
/// service produces (server-side disconnects, dropped and failing calls,
/// a close racing the answer).
#[derive(Clone)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
}

struct NetworkInner {
    config: TransportConfig,
    peers: DashMap<PeerId, PeerSlot>,
    calls: DashMap<CallId, Arc<CallShared>>,
    dials: DashMap<PeerId, usize>,
    delivery: Mutex<StreamDelivery>,
    close_on_answer: AtomicBool,
    signaling_up: AtomicBool,
}

#[derive(Clone)]
struct PeerSlot {
    handle: Uuid,
    events: mpsc::UnboundedSender<TransportEvent>,
    connected: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::with_config(TransportConfig::default())
    }

    pub fn with_config(config: TransportConfig) -> Self {
        debug!(
            "Loopback transport created ({} ICE servers configured)",
            config.ice_servers.len()
        );

        Self {
            inner: Arc::new(NetworkInner {
                config,
                peers: DashMap::new(),
                calls: DashMap::new(),
                dials: DashMap::new(),
                delivery: Mutex::new(StreamDelivery::default()),
                close_on_answer: AtomicBool::new(false),
                signaling_up: AtomicBool::new(true),
            }),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    pub fn set_stream_delivery(&self, delivery: StreamDelivery) {
        *lock(&self.inner.delivery) = delivery;
    }

    /// When enabled, every answered call closes again before `answer`
    /// returns.
    pub fn set_close_on_answer(&self, enabled: bool) {
        self.inner.close_on_answer.store(enabled, Ordering::SeqCst);
    }

    /// While unavailable, new registrations fail and reconnects are refused.
    pub fn set_signaling_available(&self, available: bool) {
        self.inner.signaling_up.store(available, Ordering::SeqCst);
    }

    pub fn is_registered(&self, peer: &PeerId) -> bool {
        self.inner.peers.get(peer).is_some_and(|slot| slot.connected)
    }

    /// How many calls have been placed to `peer` so far.
    pub fn dial_count(&self, peer: &PeerId) -> usize {
        self.inner.dials.get(peer).map_or(0, |count| *count)
    }

    pub fn active_calls(&self) -> usize {
        self.inner.calls.len()
    }

    /// Drops `peer`'s registration from the server side, as a signaling
    /// outage would. Its calls stay up.
    pub fn disconnect_peer(&self, peer: &PeerId) -> bool {
        let events = match self.inner.peers.get_mut(peer) {
            Some(mut slot) if slot.connected => {
                slot.connected = false;
                slot.events.clone()
            }
            _ => return false,
        };

        info!("Loopback: server dropped registration of {}", peer);
        let _ = events.send(TransportEvent::Disconnected);
        true
    }

    /// Closes every call `peer` takes part in. Returns how many were closed.
    pub fn interrupt_calls(&self, peer: &PeerId) -> usize {
        let calls = self.inner.calls_involving(peer);
        for call in &calls {
            call.close(&self.inner);
        }
        calls.len()
    }

    /// Reports an error on every call `peer` takes part in, without closing.
    pub fn fail_calls(&self, peer: &PeerId, message: &str) -> usize {
        let calls = self.inner.calls_involving(peer);
        for call in &calls {
            call.emit(CallEvent::Error(TransportError::new(
                TransportErrorKind::Other,
                message,
            )));
        }
        calls.len()
    }
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkInner {
    fn calls_involving(&self, peer: &PeerId) -> Vec<Arc<CallShared>> {
        self.calls
            .iter()
            .filter(|entry| &entry.caller == peer || &entry.callee == peer)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn stream_delivery(&self) -> StreamDelivery {
        *lock(&self.delivery)
    }
}

#[async_trait]
impl PeerTransport for LoopbackNetwork {
    async fn open(
        &self,
        desired: Option<PeerId>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerHandle>, TransportError> {
        let handle = LoopbackHandle {
            id: Uuid::new_v4(),
            address: desired.unwrap_or_else(PeerId::random),
            network: self.inner.clone(),
            events,
            registered: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        };

        if self.inner.signaling_up.load(Ordering::SeqCst) {
            handle.register();
        } else {
            let _ = handle.events.send(TransportEvent::Error(TransportError::new(
                TransportErrorKind::ServerUnavailable,
                "signaling server unavailable",
            )));
        }

        Ok(Arc::new(handle))
    }
}

struct LoopbackHandle {
    id: Uuid,
    address: PeerId,
    network: Arc<NetworkInner>,
    events: mpsc::UnboundedSender<TransportEvent>,
    registered: AtomicBool,
    destroyed: AtomicBool,
}

impl LoopbackHandle {
    fn register(&self) {
        let taken = self
            .network
            .peers
            .get(&self.address)
            .is_some_and(|slot| slot.handle != self.id);

        if taken {
            warn!("Loopback: address {} is already registered", self.address);
            let _ = self.events.send(TransportEvent::Error(TransportError::new(
                TransportErrorKind::UnavailableId,
                format!("ID \"{}\" is taken", self.address),
            )));
            return;
        }

        self.network.peers.insert(
            self.address.clone(),
            PeerSlot {
                handle: self.id,
                events: self.events.clone(),
                connected: true,
            },
        );
        self.registered.store(true, Ordering::SeqCst);

        debug!("Loopback: registered {}", self.address);
        let _ = self.events.send(TransportEvent::Open(self.address.clone()));
    }

    fn is_connected(&self) -> bool {
        self.network
            .peers
            .get(&self.address)
            .is_some_and(|slot| slot.handle == self.id && slot.connected)
    }
}

#[async_trait]
impl PeerHandle for LoopbackHandle {
    fn peer_id(&self) -> Option<PeerId> {
        self.registered
            .load(Ordering::SeqCst)
            .then(|| self.address.clone())
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        if self.is_destroyed() {
            return Err(TransportError::new(
                TransportErrorKind::Other,
                "cannot reconnect a destroyed peer",
            ));
        }
        if !self.network.signaling_up.load(Ordering::SeqCst) {
            return Err(TransportError::new(
                TransportErrorKind::ServerUnavailable,
                "signaling server unavailable",
            ));
        }

        self.register();
        Ok(())
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
        if !self.is_connected() {
            return Err(TransportError::new(
                TransportErrorKind::Network,
                "not connected to the signaling server",
            ));
        }

        *self.network.dials.entry(remote.clone()).or_insert(0) += 1;

        let callee = self
            .network
            .peers
            .get(remote)
            .filter(|slot| slot.connected)
            .map(|slot| slot.value().clone());

        let shared = Arc::new(CallShared {
            id: CallId::new(),
            caller: self.address.clone(),
            callee: remote.clone(),
            caller_handle: self.id,
            callee_handle: callee.as_ref().map(|slot| slot.handle),
            caller_stream: local,
            caller_events: events,
            callee_events: Mutex::new(None),
            callee_watch: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let outgoing = Arc::new(LoopbackCall {
            shared: shared.clone(),
            side: Side::Caller,
            network: self.network.clone(),
        });

        match callee {
            Some(slot) => {
                if self.network.config.debug > 0 {
                    info!("Loopback: {} dials {}", self.address, remote);
                }
                self.network.calls.insert(shared.id, shared.clone());

                let incoming: Arc<dyn MediaCall> = Arc::new(LoopbackCall {
                    shared,
                    side: Side::Callee,
                    network: self.network.clone(),
                });
                if slot.events.send(TransportEvent::Call(incoming)).is_err() {
                    warn!("Loopback: {} stopped listening for calls", remote);
                }
            }
            None => {
                let err = TransportError::new(
                    TransportErrorKind::PeerUnavailable,
                    format!("could not connect to peer {remote}"),
                );
                shared.closed.store(true, Ordering::SeqCst);
                let _ = shared
                    .caller_events
                    .send((shared.id, CallEvent::Error(err.clone())));
                let _ = self.events.send(TransportEvent::Error(err));
            }
        }

        Ok(outgoing)
    }

    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let held: Vec<Arc<CallShared>> = self
            .network
            .calls
            .iter()
            .filter(|entry| {
                entry.caller_handle == self.id || entry.callee_handle == Some(self.id)
            })
            .map(|entry| entry.value().clone())
            .collect();
        for call in held {
            call.close(&self.network);
        }

        self.network
            .peers
            .remove_if(&self.address, |_, slot| slot.handle == self.id);
        self.registered.store(false, Ordering::SeqCst);

        debug!("Loopback: destroyed handle for {}", self.address);
        let _ = self.events.send(TransportEvent::Closed);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

struct CallShared {
    id: CallId,
    caller: PeerId,
    callee: PeerId,
    caller_handle: Uuid,
    callee_handle: Option<Uuid>,
    caller_stream: MediaStream,
    caller_events: CallEventSender,
    callee_events: Mutex<Option<CallEventSender>>,
    callee_watch: Mutex<Option<CallEventSender>>,
    closed: AtomicBool,
}

impl CallShared {
    fn emit(&self, event: CallEvent) {
        let _ = self.caller_events.send((self.id, event.clone()));
        let answered = lock(&self.callee_events).clone();
        if let Some(tx) = answered.or_else(|| lock(&self.callee_watch).clone()) {
            let _ = tx.send((self.id, event));
        }
    }

    fn close(&self, network: &NetworkInner) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        network.calls.remove(&self.id);
        debug!("Loopback: call {} closed", self.id);
        self.emit(CallEvent::Closed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Caller,
    Callee,
}

struct LoopbackCall {
    shared: Arc<CallShared>,
    side: Side,
    network: Arc<NetworkInner>,
}

impl MediaCall for LoopbackCall {
    fn id(&self) -> CallId {
        self.shared.id
    }

    fn remote_peer(&self) -> &PeerId {
        match self.side {
            Side::Caller => &self.shared.callee,
            Side::Callee => &self.shared.caller,
        }
    }

    fn answer(&self, local: MediaStream, events: CallEventSender) -> Result<(), TransportError> {
        let shared = &self.shared;

        if self.side == Side::Caller {
            return Err(TransportError::new(
                TransportErrorKind::Other,
                "only the receiving side can answer",
            ));
        }
        if shared.closed.load(Ordering::SeqCst) {
            return Err(TransportError::new(
                TransportErrorKind::CallClosed,
                format!("call {} already closed", shared.id),
            ));
        }

        {
            let mut slot = lock(&shared.callee_events);
            if slot.is_some() {
                return Err(TransportError::new(
                    TransportErrorKind::Other,
                    format!("call {} already answered", shared.id),
                ));
            }
            *slot = Some(events.clone());
        }

        let _ = events.send((
            shared.id,
            CallEvent::Stream(shared.caller_stream.remote_copy()),
        ));

        let remote = local.remote_copy();
        let delivery = self.network.stream_delivery();
        if matches!(delivery, StreamDelivery::TrackEvent | StreamDelivery::Both) {
            for track in remote.tracks() {
                let _ = shared.caller_events.send((
                    shared.id,
                    CallEvent::Track {
                        track: track.clone(),
                        streams: vec![remote.clone()],
                    },
                ));
            }
        }
        if matches!(delivery, StreamDelivery::StreamEvent | StreamDelivery::Both) {
            let _ = shared
                .caller_events
                .send((shared.id, CallEvent::Stream(remote)));
        }

        if self.network.close_on_answer.load(Ordering::SeqCst) {
            shared.close(&self.network);
        }

        Ok(())
    }

    fn watch(&self, events: CallEventSender) {
        if self.side == Side::Callee {
            *lock(&self.shared.callee_watch) = Some(events);
        }
    }

    fn close(&self) {
        self.shared.close(&self.network);
    }

    fn is_open(&self) -> bool {
        !self.is_closed() && lock(&self.shared.callee_events).is_some()
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}
