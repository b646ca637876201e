use crate::error::MediaError;
use crate::media::stream::{MediaStream, MediaTrack, StreamOrigin, TrackKind};
use async_trait::async_trait;
use camshare_core::model::{CameraDevice, MediaConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of the camera's local stream.
#[async_trait]
pub trait MediaCapture: Send + Sync + 'static {
    /// Video inputs that `acquire` can be pointed at through
    /// [`MediaConfig::device_id`].
    async fn devices(&self) -> Result<Vec<CameraDevice>, MediaError>;

    /// Opens the camera. Ending every track of the returned stream releases
    /// the device; the device going away ends the tracks.
    async fn acquire(&self, config: &MediaConfig) -> Result<MediaStream, MediaError>;
}

/// In-process capture device.
///
/// Produces streams without touching hardware but keeps the hardware rule
/// that only one capture may be live at a time: a second `acquire` while the
/// previous stream still has live tracks fails with
/// [`MediaError::DeviceUnreadable`].
#[derive(Clone)]
pub struct SyntheticCapture {
    inner: Arc<SyntheticInner>,
}

struct SyntheticInner {
    devices: Vec<String>,
    delay: Mutex<Duration>,
    failure: Mutex<Option<MediaError>>,
    live: Mutex<Option<MediaStream>>,
    acquisitions: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyntheticCapture {
    pub fn new() -> Self {
        Self::with_devices(vec!["synthetic-0".to_owned()])
    }

    pub fn with_devices(devices: Vec<String>) -> Self {
        Self {
            inner: Arc::new(SyntheticInner {
                devices,
                delay: Mutex::new(Duration::ZERO),
                failure: Mutex::new(None),
                live: Mutex::new(None),
                acquisitions: AtomicUsize::new(0),
            }),
        }
    }

    /// How long each acquisition takes (the permission prompt, in practice).
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.inner.delay) = delay;
    }

    /// Makes every following acquisition fail with `failure` until cleared.
    pub fn fail_with(&self, failure: Option<MediaError>) {
        *lock(&self.inner.failure) = failure;
    }

    pub fn acquisitions(&self) -> usize {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }

    /// The most recently produced stream, if any of its tracks is still live.
    pub fn live_stream(&self) -> Option<MediaStream> {
        lock(&self.inner.live)
            .as_ref()
            .filter(|s| s.is_active())
            .cloned()
    }
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaCapture for SyntheticCapture {
    async fn devices(&self) -> Result<Vec<CameraDevice>, MediaError> {
        if let Some(failure) = lock(&self.inner.failure).clone() {
            return Err(failure);
        }
        Ok(self
            .inner
            .devices
            .iter()
            .enumerate()
            .map(|(index, id)| CameraDevice {
                device_id: id.clone(),
                label: format!("Synthetic camera {}", index + 1),
            })
            .collect())
    }

    async fn acquire(&self, config: &MediaConfig) -> Result<MediaStream, MediaError> {
        let delay = *lock(&self.inner.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = lock(&self.inner.failure).clone() {
            warn!("Synthetic capture failing on purpose: {}", failure);
            return Err(failure);
        }

        let constraints = config.constraints();
        if let Some(device_id) = &constraints.device_id {
            if !self.inner.devices.contains(device_id) {
                return Err(MediaError::DeviceNotFound);
            }
        }

        let mut live = lock(&self.inner.live);
        if live.as_ref().is_some_and(MediaStream::is_active) {
            debug!("Capture requested while previous stream is still live");
            return Err(MediaError::DeviceUnreadable);
        }

        let mut tracks = vec![MediaTrack::new(
            TrackKind::Video,
            format!(
                "synthetic {}x{}",
                constraints.ideal_width, constraints.ideal_height
            ),
        )];
        if constraints.audio {
            tracks.push(MediaTrack::new(TrackKind::Audio, "synthetic microphone"));
        }

        let stream = MediaStream::new(StreamOrigin::Capture, tracks);
        *live = Some(stream.clone());
        self.inner.acquisitions.fetch_add(1, Ordering::SeqCst);

        info!(
            "Synthetic capture started: {} ({} tracks)",
            config.resolution,
            stream.tracks().len()
        );
        Ok(stream)
    }
}
