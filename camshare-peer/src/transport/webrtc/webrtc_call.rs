use crate::error::{TransportError, TransportErrorKind};
use crate::media::{MediaSample, MediaStream, MediaTrack, StreamOrigin, TrackKind};
use crate::transport::webrtc::peer_connection::{codec_for, rtc_configuration};
use crate::transport::webrtc::signaling_message::SignalMessage;
use crate::transport::webrtc::webrtc_transport::HandleShared;
use crate::transport::{CallEvent, CallEventSender, MediaCall};
use camshare_core::{CallId, PeerId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::media::Sample;
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::rtp::codecs::opus::OpusPacket;
use webrtc::rtp::packetizer::Depacketizer;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Packets a sample builder holds back waiting for reordered ones.
const MAX_LATE: u16 = 512;
const RTCP_BUFFER: usize = 1500;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn rtc_error(context: &'static str) -> impl FnOnce(webrtc::Error) -> TransportError {
    move |e| TransportError::new(TransportErrorKind::Other, format!("{context}: {e}"))
}

pub(crate) fn new_connection_id() -> String {
    format!("mc_{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Outgoing,
    Incoming,
}

struct CallState {
    sink: Option<CallEventSender>,
    answered: bool,
    /// Remote candidates wait here until the remote description is set.
    remote_ready: bool,
    pending_remote: Vec<RTCIceCandidateInit>,
    /// Local candidates wait here until our description went out.
    held_local: Option<Vec<RTCIceCandidateInit>>,
    remote_tracks: Vec<MediaTrack>,
    tasks: Vec<JoinHandle<()>>,
}

/// One media call over an `RTCPeerConnection`, negotiated through the
/// signaling socket of the handle that created it.
pub(crate) struct WebRtcCall {
    me: Weak<WebRtcCall>,
    id: CallId,
    connection_id: String,
    remote: PeerId,
    direction: Direction,
    pc: Arc<RTCPeerConnection>,
    remote_stream_id: Uuid,
    handle: Weak<HandleShared>,
    closed: AtomicBool,
    state: Mutex<CallState>,
}

impl WebRtcCall {
    pub(crate) async fn create(
        shared: &Arc<HandleShared>,
        remote: PeerId,
        connection_id: String,
        direction: Direction,
    ) -> Result<Arc<Self>, TransportError> {
        let pc = shared
            .api()
            .new_peer_connection(rtc_configuration(shared.config()))
            .await
            .map_err(rtc_error("could not create a peer connection"))?;

        let call = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            id: CallId::new(),
            connection_id,
            remote,
            direction,
            pc: Arc::new(pc),
            remote_stream_id: Uuid::new_v4(),
            handle: Arc::downgrade(shared),
            closed: AtomicBool::new(false),
            state: Mutex::new(CallState {
                sink: None,
                answered: false,
                remote_ready: false,
                pending_remote: Vec::new(),
                held_local: Some(Vec::new()),
                remote_tracks: Vec::new(),
                tasks: Vec::new(),
            }),
        });
        call.install_handlers();
        Ok(call)
    }

    pub(crate) fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub(crate) fn bind(&self, events: CallEventSender) {
        lock(&self.state).sink = Some(events);
    }

    fn install_handlers(&self) {
        let me = self.me.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let me = me.clone();
                Box::pin(async move {
                    let (Some(candidate), Some(call)) = (candidate, me.upgrade()) else {
                        return;
                    };
                    match candidate.to_json() {
                        Ok(init) => call.local_candidate(init),
                        Err(e) => debug!("Skipping unserializable candidate: {}", e),
                    }
                })
            }));

        let me = self.me.clone();
        self.pc.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let me = me.clone();
                Box::pin(async move {
                    let Some(call) = me.upgrade() else { return };
                    debug!("Call {} peer connection {:?}", call.id, state);
                    match state {
                        RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Disconnected
                        | RTCPeerConnectionState::Closed => call.close(),
                        _ => {}
                    }
                })
            },
        ));

        let me = self.me.clone();
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let me = me.clone();
                Box::pin(async move {
                    if let Some(call) = me.upgrade() {
                        call.on_remote_track(track);
                    }
                })
            },
        ));
    }

    fn emit(&self, event: CallEvent) {
        if let Some(sink) = lock(&self.state).sink.clone() {
            let _ = sink.send((self.id, event));
        }
    }

    fn signal(&self, message: SignalMessage) {
        let sent = self
            .handle
            .upgrade()
            .is_some_and(|handle| handle.signal(message));
        if !sent {
            debug!("Call {}: signaling socket unavailable", self.id);
        }
    }

    fn local_candidate(&self, candidate: RTCIceCandidateInit) {
        {
            let mut state = lock(&self.state);
            if let Some(held) = state.held_local.as_mut() {
                held.push(candidate);
                return;
            }
        }
        self.signal(SignalMessage::candidate(
            &self.remote,
            &self.connection_id,
            candidate,
        ));
    }

    /// Sends the candidates gathered while our description was being built.
    fn release_local_candidates(&self) {
        let held = lock(&self.state).held_local.take().unwrap_or_default();
        for candidate in held {
            self.signal(SignalMessage::candidate(
                &self.remote,
                &self.connection_id,
                candidate,
            ));
        }
    }

    pub(crate) async fn add_remote_candidate(&self, candidate: RTCIceCandidateInit) {
        {
            let mut state = lock(&self.state);
            if !state.remote_ready {
                state.pending_remote.push(candidate);
                return;
            }
        }
        if let Err(e) = self.pc.add_ice_candidate(candidate).await {
            debug!("Call {}: rejected remote candidate: {}", self.id, e);
        }
    }

    async fn set_remote(&self, description: RTCSessionDescription) -> Result<(), TransportError> {
        self.pc
            .set_remote_description(description)
            .await
            .map_err(rtc_error("remote description rejected"))?;

        let pending = {
            let mut state = lock(&self.state);
            state.remote_ready = true;
            std::mem::take(&mut state.pending_remote)
        };
        for candidate in pending {
            if let Err(e) = self.pc.add_ice_candidate(candidate).await {
                debug!("Call {}: rejected buffered candidate: {}", self.id, e);
            }
        }
        Ok(())
    }

    /// Inbound side: applies the caller's offer so its candidates can be
    /// added while the call waits for an answer.
    pub(crate) async fn receive_offer(
        &self,
        offer: RTCSessionDescription,
    ) -> Result<(), TransportError> {
        self.set_remote(offer).await
    }

    /// Outbound side: attaches `local`, makes sure video can come back even
    /// when we send none, and sends the offer.
    pub(crate) async fn send_offer(&self, local: &MediaStream) -> Result<(), TransportError> {
        self.attach_local(local).await?;
        if local.video_tracks().next().is_none() {
            self.pc
                .add_transceiver_from_kind(
                    RTPCodecType::Video,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await
                .map_err(rtc_error("could not request remote video"))?;
        }

        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(rtc_error("could not create an offer"))?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(rtc_error("local offer rejected"))?;

        self.signal(SignalMessage::offer(&self.remote, &self.connection_id, offer));
        self.release_local_candidates();
        Ok(())
    }

    pub(crate) async fn accept_answer(&self, answer: RTCSessionDescription) {
        if let Err(e) = self.set_remote(answer).await {
            warn!("Call {} to {}: {}", self.id, self.remote, e);
            self.fail(e);
        }
    }

    async fn send_answer(&self, local: MediaStream) -> Result<(), TransportError> {
        self.attach_local(&local).await?;
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(rtc_error("could not create an answer"))?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(rtc_error("local answer rejected"))?;

        self.signal(SignalMessage::answer(&self.remote, &self.connection_id, answer));
        self.release_local_candidates();
        info!("Answered {} ({})", self.remote, self.connection_id);
        Ok(())
    }

    /// Adds one RTP sender per track and pumps the track's samples into it.
    async fn attach_local(&self, local: &MediaStream) -> Result<(), TransportError> {
        for track in local.tracks() {
            let output = Arc::new(TrackLocalStaticSample::new(
                codec_for(track.kind()),
                track.id().to_string(),
                local.id().to_string(),
            ));
            let sender = self
                .pc
                .add_track(Arc::clone(&output) as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(rtc_error("could not attach a local track"))?;

            // RTCP has to be drained for the interceptors to work.
            let rtcp = tokio::spawn(async move {
                let mut buf = vec![0u8; RTCP_BUFFER];
                while sender.read(&mut buf).await.is_ok() {}
            });
            let pump = tokio::spawn(pump_local(track.clone(), output));

            let mut state = lock(&self.state);
            state.tasks.push(rtcp);
            state.tasks.push(pump);
        }
        Ok(())
    }

    fn on_remote_track(&self, remote: Arc<TrackRemote>) {
        let kind = match remote.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            RTPCodecType::Video => TrackKind::Video,
            _ => return,
        };
        let track = MediaTrack::new(kind, format!("{kind:?} from {}", self.remote));

        let stream = {
            let mut state = lock(&self.state);
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            state.remote_tracks.push(track.clone());
            state.tasks.push(tokio::spawn(pump_remote(remote, track.clone())));
            MediaStream::with_id(
                self.remote_stream_id,
                StreamOrigin::Remote,
                state.remote_tracks.clone(),
            )
        };

        debug!("Call {}: remote {:?} track arrived", self.id, kind);
        self.emit(CallEvent::Track {
            track,
            streams: vec![stream],
        });
    }

    pub(crate) fn fail(&self, error: TransportError) {
        if !self.closed.load(Ordering::SeqCst) {
            self.emit(CallEvent::Error(error));
        }
        self.close();
    }
}

impl MediaCall for WebRtcCall {
    fn id(&self) -> CallId {
        self.id
    }

    fn remote_peer(&self) -> &PeerId {
        &self.remote
    }

    fn answer(&self, local: MediaStream, events: CallEventSender) -> Result<(), TransportError> {
        if self.direction == Direction::Outgoing {
            return Err(TransportError::new(
                TransportErrorKind::Other,
                "only the receiving side can answer",
            ));
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::new(
                TransportErrorKind::CallClosed,
                format!("call {} already closed", self.id),
            ));
        }
        let Some(me) = self.me.upgrade() else {
            return Err(TransportError::new(
                TransportErrorKind::CallClosed,
                format!("call {} is gone", self.id),
            ));
        };

        let mut state = lock(&self.state);
        if state.answered {
            return Err(TransportError::new(
                TransportErrorKind::Other,
                format!("call {} already answered", self.id),
            ));
        }
        state.answered = true;
        state.sink = Some(events);
        state.tasks.push(tokio::spawn(async move {
            if let Err(e) = me.send_answer(local).await {
                warn!("Failed to answer {}: {}", me.remote, e);
                me.fail(e);
            }
        }));
        Ok(())
    }

    fn watch(&self, events: CallEventSender) {
        lock(&self.state).sink.get_or_insert(events);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let (sink, tasks, tracks) = {
            let mut state = lock(&self.state);
            (
                state.sink.clone(),
                std::mem::take(&mut state.tasks),
                std::mem::take(&mut state.remote_tracks),
            )
        };
        for task in tasks {
            task.abort();
        }
        for track in tracks {
            track.stop();
        }
        if let Some(handle) = self.handle.upgrade() {
            handle.forget_call(&self.connection_id);
        }
        if let Some(sink) = sink {
            let _ = sink.send((self.id, CallEvent::Closed));
        }

        debug!("Call {} with {} closed", self.id, self.remote);
        let pc = self.pc.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = pc.close().await {
                    debug!("Peer connection close failed: {}", e);
                }
            });
        }
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
            && (self.direction == Direction::Outgoing || lock(&self.state).answered)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn pump_local(track: MediaTrack, output: Arc<TrackLocalStaticSample>) {
    let mut samples = track.subscribe_samples();
    loop {
        tokio::select! {
            _ = track.ended() => break,
            sample = samples.recv() => match sample {
                Ok(MediaSample { data, duration }) => {
                    let sample = Sample {
                        data,
                        duration,
                        ..Default::default()
                    };
                    if let Err(e) = output.write_sample(&sample).await {
                        debug!("Dropping sample: {}", e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!("Sender lagged, {} samples lost", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }
}

async fn pump_remote(remote: Arc<TrackRemote>, track: MediaTrack) {
    match track.kind() {
        TrackKind::Video => depacketize(remote, &track, H264Packet::default(), 90_000).await,
        TrackKind::Audio => depacketize(remote, &track, OpusPacket::default(), 48_000).await,
    }
    track.stop();
}

/// Reassembles RTP into samples until the remote track or ours ends.
async fn depacketize<D: Depacketizer>(
    remote: Arc<TrackRemote>,
    track: &MediaTrack,
    depacketizer: D,
    clock_rate: u32,
) {
    let mut builder = SampleBuilder::new(MAX_LATE, depacketizer, clock_rate);
    loop {
        tokio::select! {
            _ = track.ended() => return,
            packet = remote.read_rtp() => match packet {
                Ok((packet, _)) => {
                    builder.push(packet);
                    while let Some(sample) = builder.pop() {
                        track.push_sample(MediaSample {
                            data: sample.data,
                            duration: sample.duration,
                        });
                    }
                }
                Err(e) => {
                    debug!("Remote track ended: {}", e);
                    return;
                }
            },
        }
    }
}
