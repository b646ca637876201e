use crate::error::TransportError;
use crate::transport::TransportConfig;
use camshare_core::PeerId;
use serde::{Deserialize, Serialize};
use url::Url;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Protocol revision announced to the signaling server.
const CLIENT_VERSION: &str = "1.5.4";

/// Connection type of a media call in the PeerJS protocol.
pub(crate) const MEDIA_CONNECTION: &str = "media";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub(crate) enum SignalKind {
    Open,
    IdTaken,
    InvalidKey,
    Error,
    Offer,
    Answer,
    Candidate,
    Leave,
    Expire,
    Heartbeat,
    #[serde(other)]
    Unknown,
}

/// One frame on the signaling socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<SignalPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignalPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<RTCSessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<RTCIceCandidateInit>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    /// Human-readable reason on `ERROR` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl SignalMessage {
    pub(crate) fn heartbeat() -> Self {
        Self {
            kind: SignalKind::Heartbeat,
            src: None,
            dst: None,
            payload: None,
        }
    }

    fn to_peer(kind: SignalKind, dst: &PeerId, payload: SignalPayload) -> Self {
        Self {
            kind,
            src: None,
            dst: Some(dst.to_string()),
            payload: Some(payload),
        }
    }

    pub(crate) fn offer(dst: &PeerId, connection_id: &str, sdp: RTCSessionDescription) -> Self {
        Self::to_peer(
            SignalKind::Offer,
            dst,
            SignalPayload {
                sdp: Some(sdp),
                connection_type: Some(MEDIA_CONNECTION.to_owned()),
                connection_id: Some(connection_id.to_owned()),
                ..Default::default()
            },
        )
    }

    pub(crate) fn answer(dst: &PeerId, connection_id: &str, sdp: RTCSessionDescription) -> Self {
        Self::to_peer(
            SignalKind::Answer,
            dst,
            SignalPayload {
                sdp: Some(sdp),
                connection_type: Some(MEDIA_CONNECTION.to_owned()),
                connection_id: Some(connection_id.to_owned()),
                ..Default::default()
            },
        )
    }

    pub(crate) fn candidate(
        dst: &PeerId,
        connection_id: &str,
        candidate: RTCIceCandidateInit,
    ) -> Self {
        Self::to_peer(
            SignalKind::Candidate,
            dst,
            SignalPayload {
                candidate: Some(candidate),
                connection_type: Some(MEDIA_CONNECTION.to_owned()),
                connection_id: Some(connection_id.to_owned()),
                ..Default::default()
            },
        )
    }

    pub(crate) fn source(&self) -> Option<PeerId> {
        self.src.as_deref().map(PeerId::from)
    }

    pub(crate) fn connection_id(&self) -> Option<&str> {
        self.payload.as_ref()?.connection_id.as_deref()
    }

    pub(crate) fn error_text(&self) -> Option<&str> {
        self.payload.as_ref()?.msg.as_deref()
    }
}

/// Socket url for registering `id` with the server named in `config`.
pub(crate) fn signaling_url(
    config: &TransportConfig,
    id: &PeerId,
    token: &str,
) -> Result<Url, TransportError> {
    let mut url = Url::parse(&config.signaling_url).map_err(|e| {
        TransportError::classify(format!(
            "invalid signaling server url {}: {e}",
            config.signaling_url
        ))
    })?;
    url.query_pairs_mut()
        .append_pair("key", &config.signaling_key)
        .append_pair("id", id.as_str())
        .append_pair("token", token)
        .append_pair("version", CLIENT_VERSION);
    Ok(url)
}
