mod stream_view;
mod viewer;
mod viewer_command;
mod viewer_controller;

pub use stream_view::CameraStreamView;
pub use viewer::{Viewer, ViewerState};
pub use viewer_command::ViewerCommand;
