use crate::media::MediaStream;
use crate::transport::MediaCall;
use camshare_core::model::{CameraStatus, LatencyEstimate};
use camshare_core::{CallId, RoomId};
use std::sync::Arc;

/// One camera in the viewer's list.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraStreamView {
    pub room_id: RoomId,
    pub name: String,
    pub status: CameraStatus,
    /// The call currently carrying (or trying to carry) this camera.
    pub call_id: Option<CallId>,
    /// The camera's stream, once it arrived. Never the viewer's placeholder.
    pub stream: Option<MediaStream>,
    pub latency: LatencyEstimate,
    pub last_error: Option<String>,
}

impl CameraStreamView {
    pub fn is_connected(&self) -> bool {
        self.status == CameraStatus::Connected
    }
}

/// Controller-side bookkeeping behind a [`CameraStreamView`].
pub(crate) struct ViewEntry {
    pub(crate) room_id: RoomId,
    pub(crate) name: String,
    pub(crate) status: CameraStatus,
    pub(crate) call: Option<Arc<dyn MediaCall>>,
    /// Sent with the call only to satisfy the transport.
    pub(crate) placeholder: Option<MediaStream>,
    pub(crate) stream: Option<MediaStream>,
    pub(crate) last_error: Option<String>,
    pub(crate) attempts: u32,
}

impl ViewEntry {
    pub(crate) fn new(room_id: RoomId, name: String) -> Self {
        Self {
            room_id,
            name,
            status: CameraStatus::Disconnected,
            call: None,
            placeholder: None,
            stream: None,
            last_error: None,
            attempts: 0,
        }
    }

    pub(crate) fn call_id(&self) -> Option<CallId> {
        self.call.as_ref().map(|c| c.id())
    }

    /// Hangs up and stops every track this entry holds.
    pub(crate) fn release(&mut self) {
        if let Some(call) = self.call.take() {
            call.close();
        }
        if let Some(placeholder) = self.placeholder.take() {
            placeholder.stop();
        }
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
    }

    pub(crate) fn snapshot(&self) -> CameraStreamView {
        CameraStreamView {
            room_id: self.room_id.clone(),
            name: self.name.clone(),
            status: self.status,
            call_id: self.call_id(),
            stream: self.stream.clone(),
            latency: LatencyEstimate::for_status(self.status),
            last_error: self.last_error.clone(),
        }
    }
}
