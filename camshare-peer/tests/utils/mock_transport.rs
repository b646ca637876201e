use async_trait::async_trait;
use camshare_core::{CallId, PeerId};
use camshare_peer::{
    CallEvent, CallEventSender, MediaCall, MediaStream, PeerHandle, PeerTransport, TransportError,
    TransportErrorKind, TransportEvent,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Scripted transport: registers instantly and never routes calls anywhere.
/// Tests drive every event by hand through the returned handles and calls.
#[derive(Clone)]
pub struct MockTransport {
    handles: Arc<Mutex<Vec<Arc<MockHandle>>>>,
    reconnect_ok: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            reconnect_ok: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether `PeerHandle::reconnect` succeeds from now on.
    pub fn set_reconnect_ok(&self, ok: bool) {
        self.reconnect_ok.store(ok, Ordering::SeqCst);
    }

    pub fn last_handle(&self) -> Arc<MockHandle> {
        self.handles
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no handle opened yet")
    }

    pub fn handle_count(&self) -> usize {
        self.handles.lock().unwrap().len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn open(
        &self,
        desired: Option<PeerId>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerHandle>, TransportError> {
        let peer_id = desired.unwrap_or_else(PeerId::random);
        let handle = Arc::new(MockHandle {
            peer_id: peer_id.clone(),
            events,
            reconnect_ok: self.reconnect_ok.clone(),
            reconnects: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        });
        handle.emit(TransportEvent::Open(peer_id));

        self.handles.lock().unwrap().push(handle.clone());
        Ok(handle)
    }
}

pub struct MockHandle {
    peer_id: PeerId,
    events: mpsc::UnboundedSender<TransportEvent>,
    reconnect_ok: Arc<AtomicBool>,
    reconnects: AtomicUsize,
    destroyed: AtomicBool,
    calls: Mutex<Vec<Arc<MockCall>>>,
}

impl MockHandle {
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Outbound calls placed through this handle, oldest first.
    pub fn calls(&self) -> Vec<Arc<MockCall>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerHandle for MockHandle {
    fn peer_id(&self) -> Option<PeerId> {
        Some(self.peer_id.clone())
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if !self.reconnect_ok.load(Ordering::SeqCst) {
            return Err(TransportError::new(
                TransportErrorKind::ServerUnavailable,
                "mock server unavailable",
            ));
        }
        self.emit(TransportEvent::Open(self.peer_id.clone()));
        Ok(())
    }

    async fn call(
        &self,
        remote: &PeerId,
        _local: MediaStream,
        events: CallEventSender,
    ) -> Result<Arc<dyn MediaCall>, TransportError> {
        let call = Arc::new(MockCall::new(remote.clone(), Some(events)));
        self.calls.lock().unwrap().push(call.clone());
        Ok(call)
    }

    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        for call in self.calls() {
            call.close();
        }
        self.emit(TransportEvent::Closed);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

pub struct MockCall {
    id: CallId,
    remote: PeerId,
    sink: Mutex<Option<CallEventSender>>,
    closed: AtomicBool,
}

impl MockCall {
    pub fn new(remote: PeerId, sink: Option<CallEventSender>) -> Self {
        Self {
            id: CallId::new(),
            remote,
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
        }
    }

    /// Delivers `event` to whoever subscribed, bypassing any bookkeeping:
    /// emitting `Closed` twice really sends it twice.
    pub fn emit(&self, event: CallEvent) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            let _ = sink.send((self.id, event));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl MediaCall for MockCall {
    fn id(&self) -> CallId {
        self.id
    }

    fn remote_peer(&self) -> &PeerId {
        &self.remote
    }

    fn answer(&self, _local: MediaStream, events: CallEventSender) -> Result<(), TransportError> {
        *self.sink.lock().unwrap() = Some(events);
        Ok(())
    }

    fn watch(&self, events: CallEventSender) {
        self.sink.lock().unwrap().get_or_insert(events);
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.emit(CallEvent::Closed);
        }
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
