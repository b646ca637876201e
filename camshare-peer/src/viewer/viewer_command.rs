use crate::error::ConnectError;
use crate::viewer::CameraStreamView;
use camshare_core::RoomId;
use tokio::sync::oneshot;

/// Requests a [`crate::Viewer`] handle sends to its controller task.
#[derive(Debug)]
pub enum ViewerCommand {
    /// Dial the camera named by `input` (bare code or share URL).
    Connect {
        input: String,
        name: Option<String>,
        reply: oneshot::Sender<Result<CameraStreamView, ConnectError>>,
    },

    /// Hang up and forget the camera, including its saved entry.
    Disconnect {
        room_id: RoomId,
        reply: oneshot::Sender<Result<(), ConnectError>>,
    },

    /// Replace the peer session with a fresh registration.
    Reconnect {
        reply: oneshot::Sender<Result<(), ConnectError>>,
    },

    Shutdown { reply: oneshot::Sender<()> },
}
