//! Peer-connection core of camera sharing.
//!
//! A [`Broadcaster`] registers a camera under its room code and answers every
//! viewer that dials it; a [`Viewer`] dials cameras by room code, keeps their
//! streams and redials when a call drops. Both sit on a [`PeerSession`], which
//! hides the transport's event model behind a small state machine.

mod broadcast;
mod config;
mod error;
mod media;
mod registry;
mod session;
mod transport;
mod viewer;

pub use broadcast::*;
pub use config::*;
pub use error::*;
pub use media::*;
pub use registry::*;
pub use session::*;
pub use transport::*;
pub use viewer::*;
