use crate::media::stream::{MediaStream, MediaTrack, StreamOrigin, TrackKind};

/// A stream holding a single silent audio track.
///
/// The transport refuses to place a call without a local stream, so viewers
/// that have no camera of their own dial with this instead.
pub fn placeholder_stream() -> MediaStream {
    MediaStream::new(
        StreamOrigin::Placeholder,
        vec![MediaTrack::new(TrackKind::Audio, "silence")],
    )
}
