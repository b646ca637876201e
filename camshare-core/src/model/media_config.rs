use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Resolution {
    #[serde(rename = "360p")]
    P360,
    #[default]
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
}

impl Resolution {
    pub fn width(self) -> u32 {
        match self {
            Resolution::P360 => 640,
            Resolution::P480 => 854,
            Resolution::P720 => 1280,
        }
    }

    pub fn height(self) -> u32 {
        match self {
            Resolution::P360 => 360,
            Resolution::P480 => 480,
            Resolution::P720 => 720,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Resolution::P360 => "360p (low quality, low latency)",
            Resolution::P480 => "480p (standard)",
            Resolution::P720 => "720p (high quality)",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width(), self.height())
    }
}

/// Which physical camera to prefer on devices with more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// What the camera operator asked for when starting a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MediaConfig {
    pub resolution: Resolution,
    pub facing_mode: FacingMode,
    pub audio_enabled: bool,
    pub device_id: Option<String>,
}

/// A video input the host can capture from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraDevice {
    /// Value to put in [`MediaConfig::device_id`] to pick this camera.
    pub device_id: String,
    pub label: String,
}

/// Capture request derived from a [`MediaConfig`]. An explicit device wins
/// over the facing-mode hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub facing_mode: Option<FacingMode>,
    pub device_id: Option<String>,
    pub audio: bool,
}

impl MediaConfig {
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn constraints(&self) -> MediaConstraints {
        let (facing_mode, device_id) = match &self.device_id {
            Some(id) => (None, Some(id.clone())),
            None => (Some(self.facing_mode), None),
        };

        MediaConstraints {
            ideal_width: self.resolution.width(),
            ideal_height: self.resolution.height(),
            facing_mode,
            device_id,
            audio: self.audio_enabled,
        }
    }
}
