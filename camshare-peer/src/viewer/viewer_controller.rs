use crate::error::{ConnectError, TransportError, TransportErrorKind};
use crate::media::{MediaStream, StreamOrigin, placeholder_stream};
use crate::registry::CameraRegistry;
use crate::session::{PeerSession, RetryPolicy, SessionSignal, SessionStatus};
use crate::transport::{CallEvent, CallEventSender};
use crate::viewer::stream_view::ViewEntry;
use crate::viewer::{CameraStreamView, ViewerCommand, ViewerState};
use camshare_core::model::{CameraStatus, SavedCamera, decode_share_input, default_camera_name};
use camshare_core::{CallId, PeerId, RoomId, RoomIdError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Viewer-side actor: owns the session, one entry per camera in the list,
/// and the redial timers of cameras whose call closed.
pub(crate) struct ViewerController {
    session: PeerSession,
    registry: Arc<dyn CameraRegistry>,
    retry_policy: RetryPolicy,
    views: Vec<ViewEntry>,
    /// Which camera each live call belongs to. Events of calls missing here
    /// are stale.
    calls: HashMap<CallId, RoomId>,
    retries: HashMap<RoomId, JoinHandle<()>>,
    command_rx: mpsc::Receiver<ViewerCommand>,
    call_events_tx: CallEventSender,
    call_events_rx: mpsc::UnboundedReceiver<(CallId, CallEvent)>,
    retry_tx: mpsc::UnboundedSender<RoomId>,
    retry_rx: mpsc::UnboundedReceiver<RoomId>,
    state_tx: watch::Sender<ViewerState>,
}

impl ViewerController {
    pub(crate) fn new(
        session: PeerSession,
        registry: Arc<dyn CameraRegistry>,
        retry_policy: RetryPolicy,
        command_rx: mpsc::Receiver<ViewerCommand>,
        state_tx: watch::Sender<ViewerState>,
    ) -> Self {
        let (call_events_tx, call_events_rx) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();

        let views = registry
            .saved()
            .into_iter()
            .map(|saved| ViewEntry::new(saved.id, saved.name))
            .collect();

        Self {
            session,
            registry,
            retry_policy,
            views,
            calls: HashMap::new(),
            retries: HashMap::new(),
            command_rx,
            call_events_tx,
            call_events_rx,
            retry_tx,
            retry_rx,
            state_tx,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(
            "Viewer controller started with {} saved camera(s)",
            self.views.len()
        );
        self.publish();

        if let Err(e) = self.session.open().await {
            error!("Failed to open viewer session: {}", e);
        }
        self.publish();

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => {
                            if !self.handle_command(c).await {
                                break;
                            }
                        }
                        None => {
                            info!("Command channel closed. Shutting down viewer.");
                            self.shutdown().await;
                            break;
                        }
                    }
                }

                signal = self.session.next() => self.handle_session_signal(signal),

                Some((call_id, event)) = self.call_events_rx.recv() => {
                    self.handle_call_event(call_id, event);
                    self.publish();
                }

                Some(room_id) = self.retry_rx.recv() => {
                    self.handle_retry(room_id).await;
                    self.publish();
                }
            }
        }

        info!("Viewer controller finished");
    }

    /// Returns `false` once the controller should stop.
    async fn handle_command(&mut self, cmd: ViewerCommand) -> bool {
        match cmd {
            ViewerCommand::Connect { input, name, reply } => {
                let result = self.connect(&input, name).await;
                self.publish();
                let _ = reply.send(result);
            }

            ViewerCommand::Disconnect { room_id, reply } => {
                let result = self.disconnect(&room_id);
                self.publish();
                let _ = reply.send(result);
            }

            ViewerCommand::Reconnect { reply } => {
                let result = self.session.reconnect().await.map_err(ConnectError::from);
                self.publish();
                let _ = reply.send(result);
            }

            ViewerCommand::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn connect(
        &mut self,
        input: &str,
        name: Option<String>,
    ) -> Result<CameraStreamView, ConnectError> {
        let Some(room_id) = decode_share_input(input) else {
            let err = RoomId::parse(input).err().unwrap_or(RoomIdError::Empty);
            warn!("Rejected room ID {:?}: {}", input, err);
            return Err(ConnectError::InvalidRoomId(err));
        };

        if let Some(entry) = self.entry(&room_id) {
            match entry.status {
                CameraStatus::Connected => return Err(ConnectError::AlreadyConnected),
                CameraStatus::Connecting => return Ok(entry.snapshot()),
                CameraStatus::Disconnected | CameraStatus::Error => {}
            }
        }

        if !self.session.is_ready() {
            return Err(ConnectError::NotReady);
        }

        self.cancel_retry(&room_id);

        let index = match self.views.iter().position(|v| v.room_id == room_id) {
            Some(index) => index,
            None => {
                let name = name.clone().unwrap_or_else(|| default_camera_name(&room_id));
                self.views.push(ViewEntry::new(room_id.clone(), name));
                self.views.len() - 1
            }
        };
        if let Some(name) = name {
            self.views[index].name = name;
        }
        self.views[index].attempts = 0;

        info!("Connecting to camera {}", room_id);
        match self.dial(&room_id).await {
            Ok(()) => self
                .entry(&room_id)
                .map(ViewEntry::snapshot)
                .ok_or(ConnectError::UnknownCamera(room_id)),
            Err(e) => {
                if let Some(entry) = self.entry_mut(&room_id) {
                    entry.status = CameraStatus::Error;
                    entry.last_error = Some(format!("failed to connect to camera: {e}"));
                }
                Err(ConnectError::CallFailed(e))
            }
        }
    }

    /// Places a call to `room_id`, replacing whatever call its entry held.
    async fn dial(&mut self, room_id: &RoomId) -> Result<(), TransportError> {
        self.detach(room_id);

        let placeholder = placeholder_stream();
        let call = self
            .session
            .call(
                &PeerId::from(room_id),
                placeholder.clone(),
                self.call_events_tx.clone(),
            )
            .await;

        let Some(entry) = self.entry_mut(room_id) else {
            placeholder.stop();
            if let Ok(call) = call {
                call.close();
            }
            return Ok(());
        };

        match call {
            Ok(call) => {
                let call_id = call.id();
                entry.status = CameraStatus::Connecting;
                entry.last_error = None;
                entry.call = Some(call);
                entry.placeholder = Some(placeholder);
                self.calls.insert(call_id, room_id.clone());
                debug!("Dialed {} (call {})", room_id, call_id);
                Ok(())
            }
            Err(e) => {
                placeholder.stop();
                warn!("Failed to call {}: {}", room_id, e);
                Err(e)
            }
        }
    }

    fn disconnect(&mut self, room_id: &RoomId) -> Result<(), ConnectError> {
        self.cancel_retry(room_id);
        self.detach(room_id);

        if let Err(e) = self.registry.remove(room_id) {
            error!("Failed to remove {} from the registry: {}", room_id, e);
        }

        let before = self.views.len();
        self.views.retain(|v| &v.room_id != room_id);
        if self.views.len() == before {
            return Err(ConnectError::UnknownCamera(room_id.clone()));
        }

        info!("Removed camera {}", room_id);
        Ok(())
    }

    fn handle_session_signal(&mut self, signal: SessionSignal) {
        match signal {
            SessionSignal::State(state) => {
                if let (SessionStatus::Errored, Some(err)) = (state.status, state.error.as_ref()) {
                    error!("Viewer session error: {} ({})", err, err.remedy());
                }
                self.publish();
            }

            SessionSignal::Incoming(call) => {
                warn!(
                    "Viewer received a call from {}, hanging up",
                    call.remote_peer()
                );
                call.close();
            }
        }
    }

    fn handle_call_event(&mut self, call_id: CallId, event: CallEvent) {
        let Some(room_id) = self.calls.get(&call_id).cloned() else {
            debug!("Ignoring event for stale call {}", call_id);
            return;
        };

        match event {
            CallEvent::Stream(stream) => self.on_remote_stream(&room_id, stream),

            CallEvent::Track { track, streams } => {
                let stream = streams
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| MediaStream::new(StreamOrigin::Remote, vec![track]));
                self.on_remote_stream(&room_id, stream);
            }

            CallEvent::Error(e) => {
                warn!("Call to {} failed: {}", room_id, e);
                self.detach(&room_id);
                let Some(entry) = self.entry_mut(&room_id) else {
                    return;
                };
                entry.status = CameraStatus::Error;
                entry.last_error = Some("failed to connect to camera".to_owned());

                // A redial that fails, or a camera that is offline for now,
                // keeps the reconnect loop going.
                if entry.attempts > 0 || e.kind == TransportErrorKind::PeerUnavailable {
                    self.schedule_retry(&room_id);
                }
            }

            CallEvent::Closed => {
                info!("Call to {} closed", room_id);
                self.calls.remove(&call_id);
                let Some(entry) = self.entry_mut(&room_id) else {
                    return;
                };
                entry.call = None;
                entry.release();
                entry.status = CameraStatus::Disconnected;
                self.schedule_retry(&room_id);
            }
        }
    }

    fn on_remote_stream(&mut self, room_id: &RoomId, stream: MediaStream) {
        if stream.is_placeholder() {
            return;
        }
        let Some(entry) = self.entry_mut(room_id) else {
            return;
        };

        // A later snapshot of the same stream may carry more tracks.
        if entry.stream.as_ref().is_none_or(|s| s.id() == stream.id()) {
            entry.stream = Some(stream);
        }
        if entry.status == CameraStatus::Connected {
            return;
        }

        entry.status = CameraStatus::Connected;
        entry.last_error = None;
        entry.attempts = 0;
        let saved = SavedCamera::new(entry.room_id.clone(), entry.name.clone());

        info!("Receiving camera {}", room_id);
        if let Err(e) = self.registry.save(saved) {
            error!("Failed to save camera {}: {}", room_id, e);
        }
    }

    /// Arms one redial timer for `room_id`. A timer that is already armed is
    /// left alone.
    fn schedule_retry(&mut self, room_id: &RoomId) {
        if self.retries.contains_key(room_id) {
            debug!("Reconnect to {} already scheduled", room_id);
            return;
        }
        let Some(entry) = self.entry_mut(room_id) else {
            return;
        };

        entry.attempts += 1;
        let attempt = entry.attempts;
        if !self.retry_policy.allows(attempt) {
            warn!(
                "Giving up on {} after {} reconnect attempt(s)",
                room_id,
                attempt - 1
            );
            return;
        }

        let delay = self.retry_policy.delay_for(attempt);
        info!("Reconnecting to {} in {:?} (attempt {})", room_id, delay, attempt);

        let tx = self.retry_tx.clone();
        let target = room_id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(target);
        });
        self.retries.insert(room_id.clone(), timer);
    }

    async fn handle_retry(&mut self, room_id: RoomId) {
        self.retries.remove(&room_id);

        let Some(entry) = self.entry(&room_id) else {
            return;
        };
        if matches!(
            entry.status,
            CameraStatus::Connected | CameraStatus::Connecting
        ) {
            return;
        }

        if !self.session.is_ready() {
            debug!("Session not ready, postponing reconnect to {}", room_id);
            self.schedule_retry(&room_id);
            return;
        }

        info!("Reconnecting to camera {}", room_id);
        if self.dial(&room_id).await.is_err() {
            if let Some(entry) = self.entry_mut(&room_id) {
                entry.status = CameraStatus::Disconnected;
            }
            self.schedule_retry(&room_id);
        }
    }

    fn cancel_retry(&mut self, room_id: &RoomId) {
        if let Some(timer) = self.retries.remove(room_id) {
            timer.abort();
        }
    }

    /// Forgets the entry's call so its late events are ignored, then hangs
    /// up and stops its streams.
    fn detach(&mut self, room_id: &RoomId) {
        let Some(entry) = self.views.iter_mut().find(|v| &v.room_id == room_id) else {
            return;
        };
        if let Some(call_id) = entry.call_id() {
            self.calls.remove(&call_id);
        }
        entry.release();
    }

    async fn shutdown(&mut self) {
        for (_, timer) in self.retries.drain() {
            timer.abort();
        }
        self.calls.clear();
        for entry in &mut self.views {
            entry.release();
            entry.status = CameraStatus::Disconnected;
        }
        self.session.close().await;
        self.publish();
    }

    fn entry(&self, room_id: &RoomId) -> Option<&ViewEntry> {
        self.views.iter().find(|v| &v.room_id == room_id)
    }

    fn entry_mut(&mut self, room_id: &RoomId) -> Option<&mut ViewEntry> {
        self.views.iter_mut().find(|v| &v.room_id == room_id)
    }

    fn publish(&self) {
        let cameras = self.views.iter().map(ViewEntry::snapshot).collect();
        let session = self.session.state();
        self.state_tx.send_modify(|state| {
            state.session = session;
            state.cameras = cameras;
        });
    }
}
