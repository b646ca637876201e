//! Data model shared by the camera and viewer sides: room codes, share links,
//! peer/call identifiers and media settings.

pub mod model;

pub use model::{CallId, PeerId, RoomId, RoomIdError};
