use crate::broadcast::{ActiveConnection, BroadcastCommand, BroadcastState};
use crate::error::{BroadcastError, MediaError, SessionError, TransportErrorKind};
use crate::media::{MediaCapture, MediaStream};
use crate::session::{PeerSession, SessionSignal, SessionStatus};
use crate::transport::{CallEvent, CallEventSender, MediaCall};
use camshare_core::CallId;
use camshare_core::model::MediaConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type StartReply = oneshot::Sender<Result<MediaStream, BroadcastError>>;

struct CaptureResult {
    generation: u64,
    result: Result<MediaStream, MediaError>,
}

struct StartInFlight {
    generation: u64,
    task: JoinHandle<()>,
    reply: StartReply,
}

/// Camera-side actor: owns the capture stream, the session registered under
/// the room id, every answered call and the calls waiting for media.
pub(crate) struct BroadcastController {
    session: PeerSession,
    capture: Arc<dyn MediaCapture>,
    stream: Option<MediaStream>,
    connections: HashMap<CallId, ActiveConnection>,
    pending: VecDeque<Arc<dyn MediaCall>>,
    starting: Option<StartInFlight>,
    generation: Arc<AtomicU64>,
    last_error: Option<String>,
    command_rx: mpsc::Receiver<BroadcastCommand>,
    call_events_tx: CallEventSender,
    call_events_rx: mpsc::UnboundedReceiver<(CallId, CallEvent)>,
    capture_tx: mpsc::UnboundedSender<CaptureResult>,
    capture_rx: mpsc::UnboundedReceiver<CaptureResult>,
    /// Resolves when every track of the live stream ended on its own.
    stream_watch: Option<JoinHandle<()>>,
    ended_tx: mpsc::UnboundedSender<Uuid>,
    ended_rx: mpsc::UnboundedReceiver<Uuid>,
    state_tx: watch::Sender<BroadcastState>,
}

impl BroadcastController {
    pub(crate) fn new(
        session: PeerSession,
        capture: Arc<dyn MediaCapture>,
        command_rx: mpsc::Receiver<BroadcastCommand>,
        state_tx: watch::Sender<BroadcastState>,
    ) -> Self {
        let (call_events_tx, call_events_rx) = mpsc::unbounded_channel();
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();

        Self {
            session,
            capture,
            stream: None,
            connections: HashMap::new(),
            pending: VecDeque::new(),
            starting: None,
            generation: Arc::new(AtomicU64::new(0)),
            last_error: None,
            command_rx,
            call_events_tx,
            call_events_rx,
            capture_tx,
            capture_rx,
            stream_watch: None,
            ended_tx,
            ended_rx,
            state_tx,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Broadcast controller started");

        if let Err(e) = self.session.open().await {
            error!("Failed to open camera session: {}", e);
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
                            info!("Command channel closed. Shutting down broadcast.");
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

                Some(result) = self.capture_rx.recv() => self.handle_capture_result(result),

                Some(stream_id) = self.ended_rx.recv() => self.handle_stream_ended(stream_id),
            }
        }

        info!("Broadcast controller finished");
    }

    /// Returns `false` once the controller should stop.
    async fn handle_command(&mut self, cmd: BroadcastCommand) -> bool {
        match cmd {
            BroadcastCommand::Start { config, reply } => {
                self.start(config, reply);
                self.publish();
            }

            BroadcastCommand::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }

            BroadcastCommand::Reconnect { reply } => {
                // The old handle takes its calls down with it.
                self.close_connections();
                let result = self.session.reconnect().await.map_err(BroadcastError::from);
                self.publish();
                let _ = reply.send(result);
            }

            BroadcastCommand::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn start(&mut self, config: MediaConfig, reply: StartReply) {
        match self.session.status() {
            SessionStatus::Ready | SessionStatus::Disconnected => {}
            SessionStatus::Initializing => {
                let _ = reply.send(Err(BroadcastError::NotReady));
                return;
            }
            SessionStatus::Errored => {
                let err = self
                    .session
                    .state()
                    .error
                    .unwrap_or_else(|| SessionError::Other("session errored".to_owned()));
                warn!("Refusing to broadcast: {}", err);
                let _ = reply.send(Err(BroadcastError::Session(err)));
                return;
            }
            SessionStatus::Closed => {
                let _ = reply.send(Err(BroadcastError::Closed));
                return;
            }
        }

        self.cancel_start();
        if self.stream.is_some() {
            info!("Restarting capture, releasing the previous stream first");
            self.close_connections();
            self.release_stream();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.generation.clone();
        let capture = self.capture.clone();
        let results = self.capture_tx.clone();

        info!(
            "Acquiring camera ({}, facing {:?}, audio {})",
            config.resolution, config.facing_mode, config.audio_enabled
        );

        let task = tokio::spawn(async move {
            let mut result = capture.acquire(&config).await;
            if current.load(Ordering::SeqCst) != generation {
                if let Ok(stream) = result.as_ref() {
                    stream.stop();
                }
                result = Err(MediaError::Other("capture superseded".to_owned()));
            }
            let _ = results.send(CaptureResult { generation, result });
        });

        self.starting = Some(StartInFlight {
            generation,
            task,
            reply,
        });
    }

    fn handle_capture_result(&mut self, capture: CaptureResult) {
        let in_flight = match self.starting.take() {
            Some(s) if s.generation == capture.generation => s,
            other => {
                self.starting = other;
                if let Ok(stream) = capture.result {
                    debug!("Discarding superseded capture");
                    stream.stop();
                }
                return;
            }
        };

        match capture.result {
            Ok(stream) => {
                info!(
                    "Camera acquired, answering {} waiting call(s)",
                    self.pending.len()
                );
                self.stream = Some(stream.clone());
                self.last_error = None;
                self.watch_stream(&stream);

                while let Some(call) = self.pending.pop_front() {
                    self.answer(call);
                }
                self.flush_call_events();
                self.publish();

                let _ = in_flight.reply.send(Ok(stream));
            }
            Err(e) => {
                error!("Failed to acquire camera: {} ({})", e, e.remedy());
                self.last_error = Some(e.to_string());
                self.publish();
                let _ = in_flight.reply.send(Err(BroadcastError::Media(e)));
            }
        }
    }

    fn handle_session_signal(&mut self, signal: SessionSignal) {
        match signal {
            SessionSignal::State(state) => {
                if let (SessionStatus::Errored, Some(err)) = (state.status, state.error.as_ref()) {
                    error!("Camera session error: {} ({})", err, err.remedy());
                }
                self.publish();
            }

            SessionSignal::Incoming(call) => {
                if self.stream.is_some() {
                    self.answer(call);
                    self.flush_call_events();
                } else if call.is_closed() {
                    debug!("Call from {} hung up before it was queued", call.remote_peer());
                } else {
                    info!(
                        "Call from {} arrived before the camera started, queueing",
                        call.remote_peer()
                    );
                    call.watch(self.call_events_tx.clone());
                    self.pending.push_back(call);
                }
                self.publish();
            }
        }
    }

    /// Answers `call` with the live stream. The call is subscribed to this
    /// controller's event channel as part of the answer, so a close raised
    /// during the answer is queued and not lost.
    fn answer(&mut self, call: Arc<dyn MediaCall>) {
        let Some(stream) = self.stream.clone() else {
            self.pending.push_back(call);
            return;
        };

        let call_id = call.id();
        match call.answer(stream, self.call_events_tx.clone()) {
            Ok(()) => {
                info!("Answered call {} from {}", call_id, call.remote_peer());
                let mut connection = ActiveConnection::answering(call);
                connection.mark_open();
                self.connections.insert(call_id, connection);
            }
            Err(e) if e.kind == TransportErrorKind::CallClosed => {
                debug!("Call {} closed before it could be answered", call_id);
            }
            Err(e) => {
                warn!("Failed to answer call {}: {}", call_id, e);
                call.close();
            }
        }
    }

    /// Applies call events that are already queued, so a call that closed
    /// while being answered never shows up in the published count.
    fn flush_call_events(&mut self) {
        while let Ok((call_id, event)) = self.call_events_rx.try_recv() {
            self.handle_call_event(call_id, event);
        }
    }

    fn handle_call_event(&mut self, call_id: CallId, event: CallEvent) {
        match event {
            // The viewer's placeholder; nothing to show on this side.
            CallEvent::Stream(_) | CallEvent::Track { .. } => {
                if let Some(connection) = self.connections.get_mut(&call_id) {
                    connection.mark_open();
                }
            }

            CallEvent::Closed => {
                if let Some(mut connection) = self.connections.remove(&call_id) {
                    info!("Viewer {} left", connection.remote());
                    connection.close();
                } else {
                    self.forget_pending(call_id);
                }
            }

            CallEvent::Error(e) => {
                if let Some(mut connection) = self.connections.remove(&call_id) {
                    warn!("Call with {} failed: {}", connection.remote(), e);
                    connection.fail();
                } else {
                    self.forget_pending(call_id);
                }
            }
        }
    }

    fn forget_pending(&mut self, call_id: CallId) {
        if let Some(index) = self.pending.iter().position(|c| c.id() == call_id) {
            if let Some(call) = self.pending.remove(index) {
                info!("Waiting call from {} hung up", call.remote_peer());
                call.close();
            }
        }
    }

    /// Notices the capture device going away (unplugged, revoked, or stopped
    /// by the host) and shuts the broadcast down as a stop would.
    fn watch_stream(&mut self, stream: &MediaStream) {
        self.unwatch_stream();
        let stream = stream.clone();
        let ended = self.ended_tx.clone();
        self.stream_watch = Some(tokio::spawn(async move {
            stream.ended().await;
            let _ = ended.send(stream.id());
        }));
    }

    fn unwatch_stream(&mut self) {
        if let Some(task) = self.stream_watch.take() {
            task.abort();
        }
    }

    fn handle_stream_ended(&mut self, stream_id: Uuid) {
        if self.stream.as_ref().map(MediaStream::id) != Some(stream_id) {
            return;
        }
        warn!("Every camera track ended, stopping the broadcast");
        self.stream_watch = None;
        self.close_connections();
        self.release_stream();
        self.last_error = Some("camera stream ended".to_owned());
        self.publish();
    }

    fn stop(&mut self) {
        self.cancel_start();
        self.close_connections();
        self.release_stream();
        info!(
            "Broadcast stopped ({} call(s) still waiting)",
            self.pending.len()
        );
        self.publish();
    }

    async fn shutdown(&mut self) {
        self.stop();
        for call in self.pending.drain(..) {
            call.close();
        }
        self.session.close().await;
        self.publish();
    }

    fn cancel_start(&mut self) {
        if let Some(in_flight) = self.starting.take() {
            // Bumping the generation makes a capture that already finished
            // release its stream.
            self.generation.fetch_add(1, Ordering::SeqCst);
            in_flight.task.abort();
            let _ = in_flight.reply.send(Err(BroadcastError::Superseded));
        }
    }

    fn close_connections(&mut self) {
        for (_, mut connection) in self.connections.drain() {
            connection.close();
        }
        // Their close events refer to calls that are already gone.
        self.flush_call_events();
    }

    fn release_stream(&mut self) {
        self.unwatch_stream();
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
    }

    fn publish(&mut self) {
        self.pending.retain(|call| !call.is_closed());

        let mut viewers: Vec<_> = self
            .connections
            .values()
            .map(|c| c.remote().clone())
            .collect();
        viewers.sort();

        let session = self.session.state();
        self.state_tx.send_modify(|state| {
            state.session = session;
            state.broadcasting = self.stream.is_some();
            state.starting = self.starting.is_some();
            state.viewer_count = viewers.len();
            state.viewers = viewers;
            state.pending_calls = self.pending.len();
            state.last_error = self.last_error.clone();
        });
    }
}
