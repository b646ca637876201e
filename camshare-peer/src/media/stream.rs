use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// Encoded samples buffered per subscriber before the slowest one lags.
const SAMPLE_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One encoded media frame (an H.264 access unit or an Opus packet).
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSample {
    pub data: Bytes,
    pub duration: Duration,
}

#[derive(Debug)]
struct TrackState {
    ended: watch::Sender<bool>,
    samples: broadcast::Sender<MediaSample>,
}

/// Handle to one media track. Clones share state: stopping any clone ends
/// the track everywhere.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: Uuid,
    kind: TrackKind,
    label: String,
    state: Arc<TrackState>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            label: label.into(),
            state: Arc::new(TrackState {
                ended: watch::channel(false).0,
                samples: broadcast::channel(SAMPLE_BUFFER).0,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stop(&self) {
        self.state.ended.send_replace(true);
    }

    pub fn is_live(&self) -> bool {
        !*self.state.ended.borrow()
    }

    /// Resolves once the track has ended, whoever stopped it.
    pub async fn ended(&self) {
        let mut rx = self.state.ended.subscribe();
        let _ = rx.wait_for(|ended| *ended).await;
    }

    /// Hands a frame to every subscriber. Returns `false` once the track ended.
    pub fn push_sample(&self, sample: MediaSample) -> bool {
        if !self.is_live() {
            return false;
        }
        let _ = self.state.samples.send(sample);
        true
    }

    pub fn subscribe_samples(&self) -> broadcast::Receiver<MediaSample> {
        self.state.samples.subscribe()
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Where a stream came from. Placeholder streams only exist to satisfy the
/// transport and must never be shown or stored as camera output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrigin {
    Capture,
    Remote,
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct MediaStream {
    id: Uuid,
    origin: StreamOrigin,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(origin: StreamOrigin, tracks: Vec<MediaTrack>) -> Self {
        Self::with_id(Uuid::new_v4(), origin, tracks)
    }

    /// A stream that keeps `id`, for a receiver that learns its tracks one
    /// at a time and re-announces the growing stream.
    pub fn with_id(id: Uuid, origin: StreamOrigin, tracks: Vec<MediaTrack>) -> Self {
        Self { id, origin, tracks }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn origin(&self) -> StreamOrigin {
        self.origin
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin == StreamOrigin::Placeholder
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    /// True while at least one track is still live.
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(MediaTrack::is_live)
    }

    /// Resolves once every track has ended.
    pub async fn ended(&self) {
        for track in &self.tracks {
            track.ended().await;
        }
    }

    /// Stops every track, releasing whatever device backs them.
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// The stream as the receiving end of a call sees it: same track kinds and
    /// labels, independent lifetimes.
    pub fn remote_copy(&self) -> MediaStream {
        let tracks = self
            .tracks
            .iter()
            .map(|t| MediaTrack::new(t.kind(), t.label()))
            .collect();
        MediaStream::new(StreamOrigin::Remote, tracks)
    }
}

impl PartialEq for MediaStream {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
