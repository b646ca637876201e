use crate::broadcast::BroadcastCommand;
use crate::broadcast::broadcast_controller::BroadcastController;
use crate::config::CamshareConfig;
use crate::error::{BroadcastError, MediaError, SessionError};
use crate::media::{MediaCapture, MediaStream};
use crate::session::{PeerSession, SessionState, SessionStatus};
use crate::transport::PeerTransport;
use camshare_core::model::{CameraDevice, MediaConfig, ShareLink};
use camshare_core::{PeerId, RoomId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

/// What the camera operator sees.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastState {
    pub room_id: RoomId,
    pub session: SessionState,
    /// A capture stream is live and calls are answered immediately.
    pub broadcasting: bool,
    /// A capture is being acquired.
    pub starting: bool,
    /// Always `viewers.len()`.
    pub viewer_count: usize,
    pub viewers: Vec<PeerId>,
    /// Calls received before the camera started.
    pub pending_calls: usize,
    pub last_error: Option<String>,
}

impl BroadcastState {
    fn new(room_id: RoomId, session: SessionState) -> Self {
        Self {
            room_id,
            session,
            broadcasting: false,
            starting: false,
            viewer_count: 0,
            viewers: Vec::new(),
            pending_calls: 0,
            last_error: None,
        }
    }
}

/// Handle to a camera broadcasting under one room id.
///
/// Cloning is cheap; the controller task keeps running until
/// [`Broadcaster::shutdown`] is called or every handle is dropped.
#[derive(Clone)]
pub struct Broadcaster {
    room_id: RoomId,
    share_origin: String,
    capture: Arc<dyn MediaCapture>,
    command_tx: mpsc::Sender<BroadcastCommand>,
    state_rx: watch::Receiver<BroadcastState>,
}

impl Broadcaster {
    /// Spawns the controller and registers the session under `room_id`.
    pub fn spawn(
        room_id: RoomId,
        transport: Arc<dyn PeerTransport>,
        capture: Arc<dyn MediaCapture>,
        config: &CamshareConfig,
    ) -> Self {
        info!("Starting camera for room {}", room_id);

        let session = PeerSession::new(
            transport,
            Some(PeerId::from(&room_id)),
            config.session_retry.clone(),
        );
        let (command_tx, command_rx) = mpsc::channel(32);
        let (state_tx, state_rx) =
            watch::channel(BroadcastState::new(room_id.clone(), session.state()));

        let controller =
            BroadcastController::new(session, capture.clone(), command_rx, state_tx);
        tokio::spawn(controller.run());

        Self {
            room_id,
            share_origin: config.share.origin.clone(),
            capture,
            command_tx,
            state_rx,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn share_link(&self) -> ShareLink {
        ShareLink::new(&self.share_origin, &self.room_id)
    }

    pub fn state(&self) -> BroadcastState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BroadcastState> {
        self.state_rx.clone()
    }

    /// Waits until the session has left the initializing state and reports
    /// whether it registered.
    pub async fn ready(&self) -> Result<(), BroadcastError> {
        let mut rx = self.state_rx.clone();
        let session = rx
            .wait_for(|s| s.session.status != SessionStatus::Initializing)
            .await
            .map_err(|_| BroadcastError::Closed)?
            .session
            .clone();

        match session.status {
            SessionStatus::Ready | SessionStatus::Disconnected => Ok(()),
            SessionStatus::Errored => Err(BroadcastError::Session(
                session
                    .error
                    .unwrap_or_else(|| SessionError::Other("session errored".to_owned())),
            )),
            SessionStatus::Closed => Err(BroadcastError::Closed),
            SessionStatus::Initializing => Err(BroadcastError::NotReady),
        }
    }

    /// Cameras the operator can pick from before starting.
    pub async fn devices(&self) -> Result<Vec<CameraDevice>, MediaError> {
        self.capture.devices().await
    }

    /// Acquires the camera with `config` and answers every call that was
    /// waiting for it.
    pub async fn start_broadcast(&self, config: MediaConfig) -> Result<MediaStream, BroadcastError> {
        self.request(|reply| BroadcastCommand::Start { config, reply })
            .await?
    }

    /// Hangs up on every viewer and releases the camera. Calls still waiting
    /// for the camera stay queued.
    pub async fn stop_broadcast(&self) -> Result<(), BroadcastError> {
        self.request(|reply| BroadcastCommand::Stop { reply }).await
    }

    pub async fn reconnect(&self) -> Result<(), BroadcastError> {
        self.request(|reply| BroadcastCommand::Reconnect { reply })
            .await?
    }

    pub async fn shutdown(&self) {
        let _ = self
            .request(|reply| BroadcastCommand::Shutdown { reply })
            .await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> BroadcastCommand,
    ) -> Result<T, BroadcastError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| BroadcastError::Closed)?;
        rx.await.map_err(|_| BroadcastError::Closed)
    }
}
