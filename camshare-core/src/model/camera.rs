use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::model::room::RoomId;

/// Connection state of one camera in a viewer's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CameraStatus::Connecting => "connecting",
            CameraStatus::Connected => "connected",
            CameraStatus::Disconnected => "disconnected",
            CameraStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Lifecycle of one viewer's call on the camera side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Answering,
    Open,
    Closed,
    Error,
}

/// Latency shown next to a camera.
///
/// Round-trip time is not measured; connected cameras carry a fixed
/// placeholder so the UI has something to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatencyEstimate {
    NotApplicable,
    Placeholder,
}

impl LatencyEstimate {
    pub const PLACEHOLDER: Duration = Duration::from_millis(100);

    pub fn for_status(status: CameraStatus) -> Self {
        match status {
            CameraStatus::Connected => LatencyEstimate::Placeholder,
            _ => LatencyEstimate::NotApplicable,
        }
    }

    pub fn as_duration(self) -> Option<Duration> {
        match self {
            LatencyEstimate::Placeholder => Some(Self::PLACEHOLDER),
            LatencyEstimate::NotApplicable => None,
        }
    }
}

impl fmt::Display for LatencyEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_duration() {
            Some(d) => write!(f, "~{}ms", d.as_millis()),
            None => f.write_str("-"),
        }
    }
}

/// A camera remembered by a viewer device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCamera {
    pub id: RoomId,
    pub name: String,
    pub last_connected: DateTime<Utc>,
}

impl SavedCamera {
    pub fn new(id: RoomId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            last_connected: Utc::now(),
        }
    }
}

/// Name given to a camera the user did not name explicitly.
pub fn default_camera_name(id: &RoomId) -> String {
    format!("Camera {}", id.short_label())
}
