pub use camshare_core::{CallId, PeerId, RoomId, RoomIdError};

pub mod model {
    pub use camshare_core::model::*;
}

#[cfg(feature = "peer")]
pub mod peer {
    pub use camshare_peer::*;
}
