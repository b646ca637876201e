use crate::error::BroadcastError;
use crate::media::MediaStream;
use camshare_core::model::MediaConfig;
use tokio::sync::oneshot;

/// Requests a [`crate::Broadcaster`] handle sends to its controller task.
#[derive(Debug)]
pub enum BroadcastCommand {
    /// Acquire the camera and answer every waiting call.
    Start {
        config: MediaConfig,
        reply: oneshot::Sender<Result<MediaStream, BroadcastError>>,
    },

    /// Hang up on every viewer and release the camera.
    Stop { reply: oneshot::Sender<()> },

    /// Replace the peer session with a fresh registration.
    Reconnect {
        reply: oneshot::Sender<Result<(), BroadcastError>>,
    },

    Shutdown { reply: oneshot::Sender<()> },
}
