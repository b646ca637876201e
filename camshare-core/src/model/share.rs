use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};
use url::Url;

/// Path of the viewer page a share link points to.
pub const VIEWER_PATH: &str = "/camera/viewer";

/// Query parameter carrying the room code.
pub const ROOM_QUERY_PARAM: &str = "room";

/// Everything needed to hand a camera to another device: the link itself plus
/// the title/text pair a platform share sheet expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub url: String,
    pub title: String,
    pub text: String,
}

impl ShareLink {
    pub fn new(origin: &str, room_id: &RoomId) -> Self {
        Self {
            url: share_url(origin, room_id),
            title: "Camera sharing".to_owned(),
            text: format!("Open this link to watch the camera. Room ID: {room_id}"),
        }
    }
}

/// Builds `<origin>/camera/viewer?room=<id>`.
pub fn share_url(origin: &str, room_id: &RoomId) -> String {
    match Url::parse(origin).and_then(|base| base.join(VIEWER_PATH)) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .clear()
                .append_pair(ROOM_QUERY_PARAM, room_id.as_str());
            url.to_string()
        }
        Err(_) => format!(
            "{}{}?{}={}",
            origin.trim_end_matches('/'),
            VIEWER_PATH,
            ROOM_QUERY_PARAM,
            room_id
        ),
    }
}

/// Extracts a room ID from whatever the user scanned or typed: a share URL
/// or a bare code in any letter case. Returns `None` instead of failing.
pub fn decode_share_input(input: &str) -> Option<RoomId> {
    let input = input.trim();

    if input.contains("room=") {
        let from_url = Url::parse(input).ok().and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == ROOM_QUERY_PARAM)
                .and_then(|(_, value)| RoomId::parse(&value).ok())
        });
        if from_url.is_some() {
            return from_url;
        }
    }

    RoomId::parse(input).ok()
}
