use crate::config::CamshareConfig;
use crate::error::ConnectError;
use crate::registry::CameraRegistry;
use crate::session::{PeerSession, SessionState, SessionStatus};
use crate::transport::PeerTransport;
use crate::viewer::viewer_controller::ViewerController;
use crate::viewer::{CameraStreamView, ViewerCommand};
use camshare_core::RoomId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pub session: SessionState,
    pub cameras: Vec<CameraStreamView>,
}

/// Handle to a viewer device's camera list.
#[derive(Clone)]
pub struct Viewer {
    command_tx: mpsc::Sender<ViewerCommand>,
    state_rx: watch::Receiver<ViewerState>,
}

impl Viewer {
    /// Spawns the controller. Cameras saved in `registry` are listed as
    /// disconnected until connected again.
    pub fn spawn(
        transport: Arc<dyn PeerTransport>,
        registry: Arc<dyn CameraRegistry>,
        config: &CamshareConfig,
    ) -> Self {
        let session = PeerSession::new(transport, None, config.session_retry.clone());
        let (command_tx, command_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ViewerState {
            session: session.state(),
            cameras: Vec::new(),
        });

        let controller = ViewerController::new(
            session,
            registry,
            config.viewer_retry.clone(),
            command_rx,
            state_tx,
        );
        tokio::spawn(controller.run());

        Self {
            command_tx,
            state_rx,
        }
    }

    pub fn state(&self) -> ViewerState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewerState> {
        self.state_rx.clone()
    }

    pub fn views(&self) -> Vec<CameraStreamView> {
        self.state_rx.borrow().cameras.clone()
    }

    pub fn view(&self, room_id: &RoomId) -> Option<CameraStreamView> {
        self.state_rx
            .borrow()
            .cameras
            .iter()
            .find(|v| &v.room_id == room_id)
            .cloned()
    }

    /// Waits until the session is registered.
    pub async fn ready(&self) -> Result<(), ConnectError> {
        let mut rx = self.state_rx.clone();
        let session = rx
            .wait_for(|s| s.session.status != SessionStatus::Initializing)
            .await
            .map_err(|_| ConnectError::Closed)?
            .session
            .clone();

        match (session.status, session.error) {
            (SessionStatus::Ready, _) => Ok(()),
            (SessionStatus::Errored, Some(err)) => Err(ConnectError::Session(err)),
            (SessionStatus::Closed, _) => Err(ConnectError::Closed),
            _ => Err(ConnectError::NotReady),
        }
    }

    /// Dials the camera named by `input`, a bare room code in any case or a
    /// share URL. Without `name` the camera is called `Camera <ABC-DEF>`.
    pub async fn connect(
        &self,
        input: &str,
        name: Option<String>,
    ) -> Result<CameraStreamView, ConnectError> {
        let input = input.to_owned();
        self.request(|reply| ViewerCommand::Connect { input, name, reply })
            .await?
    }

    /// Hangs up, drops the camera from the list and from the registry.
    pub async fn disconnect(&self, room_id: &RoomId) -> Result<(), ConnectError> {
        let room_id = room_id.clone();
        self.request(|reply| ViewerCommand::Disconnect { room_id, reply })
            .await?
    }

    pub async fn reconnect(&self) -> Result<(), ConnectError> {
        self.request(|reply| ViewerCommand::Reconnect { reply })
            .await?
    }

    pub async fn shutdown(&self) {
        let _ = self
            .request(|reply| ViewerCommand::Shutdown { reply })
            .await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ViewerCommand,
    ) -> Result<T, ConnectError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| ConnectError::Closed)?;
        rx.await.map_err(|_| ConnectError::Closed)
    }
}
