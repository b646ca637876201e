use camshare_core::{RoomId, RoomIdError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The requested address is held by another live session.
    UnavailableId,
    Network,
    /// The signaling service could not be reached.
    ServerUnavailable,
    /// A call was placed to an address nobody is registered under.
    PeerUnavailable,
    /// The call was already closed when the operation ran.
    CallClosed,
    Other,
}

/// Error reported by the peer transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Infers the kind from a free-form message, for transports that only
    /// hand out strings.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if message.contains("ID") && message.contains("taken") {
            TransportErrorKind::UnavailableId
        } else if message.contains("network") {
            TransportErrorKind::Network
        } else if message.contains("unavailable") {
            TransportErrorKind::ServerUnavailable
        } else {
            TransportErrorKind::Other
        };
        Self { kind, message }
    }
}

/// Why a peer session ended up in the errored state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("the requested room ID is already in use")]
    AddressTaken,

    #[error("a network error occurred")]
    Network,

    #[error("the signaling service is unreachable")]
    SignalingUnavailable,

    #[error("peer connection error: {0}")]
    Other(String),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err.kind {
            TransportErrorKind::UnavailableId => SessionError::AddressTaken,
            TransportErrorKind::Network => SessionError::Network,
            TransportErrorKind::ServerUnavailable => SessionError::SignalingUnavailable,
            _ => SessionError::Other(err.message),
        }
    }
}

impl SessionError {
    pub fn remedy(&self) -> &'static str {
        match self {
            SessionError::AddressTaken => "Start a new session to get a different room ID.",
            SessionError::Network | SessionError::SignalingUnavailable => {
                "Check the network connection; the session reconnects on its own."
            }
            SessionError::Other(_) => "Reconnect the session and try again.",
        }
    }
}

/// Failure to acquire the local camera.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("camera access was denied")]
    PermissionDenied,

    #[error("no camera was found")]
    DeviceNotFound,

    #[error("the camera cannot be read")]
    DeviceUnreadable,

    #[error("the camera does not support the requested settings")]
    ConstraintsUnsatisfiable,

    #[error("failed to start the camera: {0}")]
    Other(String),
}

impl MediaError {
    /// Maps the error names browsers and most capture stacks report.
    pub fn from_capture_error(name: &str, message: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" => MediaError::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" => MediaError::DeviceNotFound,
            "NotReadableError" | "TrackStartError" => MediaError::DeviceUnreadable,
            "OverconstrainedError" => MediaError::ConstraintsUnsatisfiable,
            _ => MediaError::Other(message.to_owned()),
        }
    }

    pub fn remedy(&self) -> &'static str {
        match self {
            MediaError::PermissionDenied => "Allow camera access in the system or browser settings.",
            MediaError::DeviceNotFound => "Make sure a camera is connected.",
            MediaError::DeviceUnreadable => {
                "The camera may be in use by another application. Close it and retry."
            }
            MediaError::ConstraintsUnsatisfiable => "Pick a lower resolution or another camera.",
            MediaError::Other(_) => "Retry starting the camera.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("the peer session is not ready yet")]
    NotReady,

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("the broadcast was superseded by a newer start request")]
    Superseded,

    #[error("the broadcast controller has shut down")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("{}", .0.hint())]
    InvalidRoomId(#[from] RoomIdError),

    #[error("this camera is already connected")]
    AlreadyConnected,

    #[error("the peer session is not ready yet")]
    NotReady,

    #[error("failed to connect to the camera: {0}")]
    CallFailed(TransportError),

    #[error("camera {0} is not in the list")]
    UnknownCamera(RoomId),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("the viewer controller has shut down")]
    Closed,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to write camera registry: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode camera registry: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
