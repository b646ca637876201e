mod camera;
mod media_config;
mod peer;
mod room;
mod share;

pub use camera::{CameraStatus, ConnectionStatus, LatencyEstimate, SavedCamera, default_camera_name};
pub use media_config::{CameraDevice, FacingMode, MediaConfig, MediaConstraints, Resolution};
pub use peer::{CallId, PeerId};
pub use room::{
    ROOM_ID_ALPHABET, ROOM_ID_EXAMPLE, ROOM_ID_SEGMENT_LENGTH, ROOM_ID_SEGMENTS,
    ROOM_ID_SEPARATOR, RoomId, RoomIdError, is_valid, normalize,
};
pub use share::{ROOM_QUERY_PARAM, ShareLink, VIEWER_PATH, decode_share_input, share_url};
