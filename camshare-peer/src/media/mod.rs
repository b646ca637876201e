mod capture;
#[cfg(feature = "camera")]
mod h264_encoder;
#[cfg(feature = "camera")]
mod nokhwa_capture;
mod placeholder;
mod stream;

pub use capture::{MediaCapture, SyntheticCapture};
#[cfg(feature = "camera")]
pub use nokhwa_capture::NokhwaCapture;
pub use placeholder::placeholder_stream;
pub use stream::{MediaSample, MediaStream, MediaTrack, StreamOrigin, TrackKind};
