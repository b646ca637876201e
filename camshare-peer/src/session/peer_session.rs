use crate::error::{SessionError, TransportError, TransportErrorKind};
use crate::media::MediaStream;
use crate::session::RetryPolicy;
use crate::transport::{CallEventSender, MediaCall, PeerHandle, PeerTransport, TransportEvent};
use camshare_core::PeerId;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Initializing,
    Ready,
    /// Registration was dropped by the server; a reconnect is pending.
    Disconnected,
    /// Needs an explicit [`PeerSession::reconnect`].
    Errored,
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::Ready => "ready",
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Errored => "errored",
            SessionStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub status: SessionStatus,
    pub peer_id: Option<PeerId>,
    pub error: Option<SessionError>,
}

impl SessionState {
    fn initializing() -> Self {
        Self {
            status: SessionStatus::Initializing,
            peer_id: None,
            error: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == SessionStatus::Ready
    }
}

/// What a session reports to its owner.
pub enum SessionSignal {
    /// The session state changed.
    State(SessionState),
    /// A remote peer dialed this session's address.
    Incoming(Arc<dyn MediaCall>),
}

/// One registration with the signaling service, turned into a plain state
/// machine.
///
/// The owner drives it by polling [`PeerSession::next`] (typically inside its
/// own `select!` loop); server-initiated disconnects are retried according to
/// the session's [`RetryPolicy`] without the owner's involvement.
pub struct PeerSession {
    transport: Arc<dyn PeerTransport>,
    desired: Option<PeerId>,
    policy: RetryPolicy,
    handle: Option<Arc<dyn PeerHandle>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    state_tx: watch::Sender<SessionState>,
    attempts: u32,
    retry: Option<JoinHandle<()>>,
}

impl PeerSession {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        desired: Option<PeerId>,
        policy: RetryPolicy,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::initializing());

        Self {
            transport,
            desired,
            policy,
            handle: None,
            events_tx,
            events_rx,
            state_tx,
            attempts: 0,
            retry: None,
        }
    }

    /// Requests a registration. The outcome is reported through
    /// [`PeerSession::next`]; an error here means no handle could be created.
    pub async fn open(&mut self) -> Result<(), SessionError> {
        self.release().await;

        // Events of earlier handles must not leak into this one.
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_tx = events_tx;
        self.events_rx = events_rx;
        self.attempts = 0;
        self.set_state(SessionState::initializing());

        info!(
            "Opening peer session{}",
            self.desired
                .as_ref()
                .map(|id| format!(" under {id}"))
                .unwrap_or_default()
        );

        match self
            .transport
            .open(self.desired.clone(), self.events_tx.clone())
            .await
        {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("Failed to create peer handle: {}", e);
                let err = SessionError::from(e);
                self.set_errored(err.clone());
                Err(err)
            }
        }
    }

    /// Closes the current handle and opens a fresh one under the same
    /// address.
    pub async fn reconnect(&mut self) -> Result<(), SessionError> {
        info!("Reconnecting peer session");
        self.open().await
    }

    /// Closes every call held by the session and releases the handle.
    /// Closing twice is a no-op.
    pub async fn close(&mut self) {
        if self.status() == SessionStatus::Closed {
            return;
        }

        self.release().await;
        let peer_id = self.state_tx.borrow().peer_id.clone();
        self.set_state(SessionState {
            status: SessionStatus::Closed,
            peer_id,
            error: None,
        });
        info!("Peer session closed");
    }

    /// Dials `remote`. `events` is bound to the call before dialing starts.
    pub async fn call(
        &self,
        remote: &PeerId,
        local: MediaStream,
        events: CallEventSender,
    ) -> Result<Arc<dyn MediaCall>, TransportError> {
        let Some(handle) = self.handle.as_ref().filter(|_| self.is_ready()) else {
            return Err(TransportError::new(
                TransportErrorKind::Network,
                format!("peer session is {}", self.status()),
            ));
        };

        handle.call(remote, local, events).await
    }

    /// Waits for the next state change or inbound call.
    ///
    /// Cancel-safe: dropping the future before it completes loses nothing.
    pub async fn next(&mut self) -> SessionSignal {
        loop {
            // `events_tx` lives in `self`, so the channel never closes.
            let Some(event) = self.events_rx.recv().await else {
                std::future::pending::<()>().await;
                continue;
            };

            if let Some(signal) = self.handle_event(event) {
                return signal;
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state_tx.borrow().status
    }

    pub fn is_ready(&self) -> bool {
        self.status() == SessionStatus::Ready
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.state_tx.borrow().peer_id.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    fn handle_event(&mut self, event: TransportEvent) -> Option<SessionSignal> {
        match event {
            TransportEvent::Open(peer_id) => {
                info!("Peer session ready as {}", peer_id);
                self.attempts = 0;
                self.update(SessionState {
                    status: SessionStatus::Ready,
                    peer_id: Some(peer_id),
                    error: None,
                })
            }

            TransportEvent::Error(err) if err.kind == TransportErrorKind::PeerUnavailable => {
                // Reported on the call itself; the registration is fine.
                debug!("Ignoring session-level peer-unavailable error: {}", err);
                None
            }

            TransportEvent::Error(err) => {
                if self.status() == SessionStatus::Closed {
                    return None;
                }
                error!("Peer session error: {}", err);
                self.set_errored(SessionError::from(err));
                Some(SessionSignal::State(self.state()))
            }

            TransportEvent::Disconnected => self.on_disconnected(),

            TransportEvent::Closed => {
                if matches!(self.status(), SessionStatus::Closed | SessionStatus::Errored) {
                    return None;
                }
                warn!("Peer handle closed underneath the session");
                let peer_id = self.peer_id();
                self.update(SessionState {
                    status: SessionStatus::Closed,
                    peer_id,
                    error: None,
                })
            }

            TransportEvent::Call(call) => {
                if self.status() == SessionStatus::Closed {
                    call.close();
                    return None;
                }
                debug!("Incoming call {} from {}", call.id(), call.remote_peer());
                Some(SessionSignal::Incoming(call))
            }
        }
    }

    fn on_disconnected(&mut self) -> Option<SessionSignal> {
        if matches!(self.status(), SessionStatus::Closed | SessionStatus::Errored) {
            return None;
        }
        let Some(handle) = self.handle.clone() else {
            return None;
        };

        self.attempts += 1;
        if !self.policy.allows(self.attempts) {
            error!(
                "Giving up on the signaling service after {} attempts",
                self.attempts - 1
            );
            self.set_errored(SessionError::SignalingUnavailable);
            return Some(SessionSignal::State(self.state()));
        }

        let delay = self.policy.delay_for(self.attempts);
        warn!(
            "Peer session disconnected, reconnect attempt {} in {:?}",
            self.attempts, delay
        );

        let events = self.events_tx.clone();
        if let Some(previous) = self.retry.take() {
            previous.abort();
        }
        self.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if handle.is_destroyed() {
                return;
            }
            if let Err(e) = handle.reconnect().await {
                warn!("Reconnect attempt failed: {}", e);
                let _ = events.send(TransportEvent::Disconnected);
            }
        }));

        let peer_id = self.peer_id();
        self.update(SessionState {
            status: SessionStatus::Disconnected,
            peer_id,
            error: None,
        })
    }

    async fn release(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
        if let Some(handle) = self.handle.take() {
            handle.destroy().await;
        }
    }

    fn set_errored(&mut self, err: SessionError) {
        let peer_id = self.peer_id();
        self.set_state(SessionState {
            status: SessionStatus::Errored,
            peer_id,
            error: Some(err),
        });
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    /// Publishes `state` and turns it into a signal when it differs from the
    /// current one.
    fn update(&self, state: SessionState) -> Option<SessionSignal> {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state.clone();
            true
        });
        changed.then_some(SessionSignal::State(state))
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }
}
