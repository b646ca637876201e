use crate::error::MediaError;
use crate::media::h264_encoder::H264Encoder;
use crate::media::{MediaCapture, MediaSample, MediaStream, MediaTrack, StreamOrigin, TrackKind};
use async_trait::async_trait;
use bytes::Bytes;
use camshare_core::model::{CameraDevice, MediaConfig, Resolution};
use nokhwa::CallbackCamera;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::query;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
    RequestedFormatType,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const FRAME_RATE: u32 = 30;

fn bitrate_for(resolution: Resolution) -> u32 {
    match resolution {
        Resolution::P360 => 600_000,
        Resolution::P480 => 1_000_000,
        Resolution::P720 => 2_500_000,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Capture from a local webcam through the platform's native backend
/// (V4L2, AVFoundation or Media Foundation).
///
/// Frames are decoded to RGB, encoded to H.264 on a dedicated thread and
/// pushed into the stream's video track. Device ids are the backend's
/// camera indices as strings. Audio is not captured.
#[derive(Clone, Default)]
pub struct NokhwaCapture {
    live: Arc<Mutex<Option<MediaStream>>>,
}

impl NokhwaCapture {
    pub fn new() -> Self {
        Self::default()
    }
}

async fn query_cameras() -> Result<Vec<CameraInfo>, MediaError> {
    tokio::task::spawn_blocking(|| query(ApiBackend::Auto))
        .await
        .map_err(|e| MediaError::Other(format!("camera query panicked: {e}")))?
        .map_err(|e| {
            warn!("Failed to query cameras: {}", e);
            MediaError::DeviceNotFound
        })
}

#[async_trait]
impl MediaCapture for NokhwaCapture {
    async fn devices(&self) -> Result<Vec<CameraDevice>, MediaError> {
        let cameras = query_cameras().await?;
        Ok(cameras
            .into_iter()
            .map(|info| CameraDevice {
                device_id: info.index().to_string(),
                label: info.human_name(),
            })
            .collect())
    }

    async fn acquire(&self, config: &MediaConfig) -> Result<MediaStream, MediaError> {
        if lock(&self.live).as_ref().is_some_and(MediaStream::is_active) {
            debug!("Capture requested while previous stream is still live");
            return Err(MediaError::DeviceUnreadable);
        }

        let constraints = config.constraints();
        if constraints.audio {
            warn!("Audio capture is not supported, sending video only");
        }

        let cameras = query_cameras().await?;
        let camera = match &constraints.device_id {
            Some(id) => cameras.iter().find(|c| &c.index().to_string() == id),
            // Desktop cameras report no facing; take the first one.
            None => cameras.first(),
        }
        .ok_or(MediaError::DeviceNotFound)?;

        let index = camera.index().clone();
        let track = MediaTrack::new(TrackKind::Video, camera.human_name());
        let (opened_tx, opened_rx) = oneshot::channel();

        let worker = CaptureWorker {
            index,
            width: constraints.ideal_width,
            height: constraints.ideal_height,
            bitrate: bitrate_for(config.resolution),
            track: track.clone(),
        };
        thread::Builder::new()
            .name("camshare-capture".to_owned())
            .spawn(move || worker.run(opened_tx))
            .map_err(|e| MediaError::Other(format!("could not start capture thread: {e}")))?;

        opened_rx
            .await
            .map_err(|_| MediaError::Other("capture thread exited".to_owned()))??;

        let stream = MediaStream::new(StreamOrigin::Capture, vec![track]);
        *lock(&self.live) = Some(stream.clone());
        info!(
            "Camera {} started at {} ({})",
            camera.human_name(),
            config.resolution,
            camera.index()
        );
        Ok(stream)
    }
}

struct CaptureWorker {
    index: CameraIndex,
    width: u32,
    height: u32,
    bitrate: u32,
    track: MediaTrack,
}

impl CaptureWorker {
    /// Reports on `opened` once the device streams, then pumps frames until
    /// the track is stopped or the device fails. The track ends either way.
    fn run(self, opened: oneshot::Sender<Result<(), MediaError>>) {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new_from(self.width, self.height, FrameFormat::MJPEG, FRAME_RATE),
        ));

        let mut camera = match CallbackCamera::new(self.index.clone(), requested, |_| {}) {
            Ok(camera) => camera,
            Err(e) => {
                warn!("Failed to open camera {}: {}", self.index, e);
                let _ = opened.send(Err(MediaError::DeviceUnreadable));
                return;
            }
        };
        if let Err(e) = camera.open_stream() {
            warn!("Failed to start camera {}: {}", self.index, e);
            let _ = opened.send(Err(MediaError::DeviceUnreadable));
            return;
        }
        let mut encoder = match H264Encoder::new(FRAME_RATE, self.bitrate) {
            Ok(encoder) => encoder,
            Err(e) => {
                let _ = camera.stop_stream();
                let _ = opened.send(Err(e));
                return;
            }
        };
        let _ = opened.send(Ok(()));

        let frame_duration = Duration::from_secs(1) / FRAME_RATE;
        while self.track.is_live() {
            let frame = match camera.poll_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Camera {} stopped delivering frames: {}", self.index, e);
                    break;
                }
            };
            let image = match frame.decode_image::<RgbFormat>() {
                Ok(image) => image,
                Err(e) => {
                    debug!("Dropping undecodable frame: {}", e);
                    continue;
                }
            };

            let (width, height) = (image.width() as usize, image.height() as usize);
            match encoder.encode(image.as_raw(), width, height) {
                Ok(data) if data.is_empty() => {}
                Ok(data) => {
                    self.track.push_sample(MediaSample {
                        data: Bytes::from(data),
                        duration: frame_duration,
                    });
                }
                Err(e) => {
                    warn!("Stopping capture: {}", e);
                    break;
                }
            }
        }

        if let Err(e) = camera.stop_stream() {
            debug!("Failed to stop camera {}: {}", self.index, e);
        }
        self.track.stop();
        info!("Camera {} released", self.index);
    }
}
