use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Address a peer session is registered under with the signaling service.
///
/// Cameras register under their room code; viewers usually let the transport
/// assign one.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// A fresh transport-style address.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&RoomId> for PeerId {
    fn from(room_id: &RoomId) -> Self {
        Self(room_id.as_str().to_owned())
    }
}

impl From<RoomId> for PeerId {
    fn from(room_id: RoomId) -> Self {
        Self(room_id.into_inner())
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one call (media connection) for its whole lifetime.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Hash, Eq, PartialEq)]
pub struct CallId(pub Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
