use camshare_core::model::{CameraStatus, LatencyEstimate, MediaConfig};
use camshare_core::{PeerId, RoomIdError};
use camshare_peer::{ConnectError, LoopbackNetwork, SessionError};

use crate::integration::{init_tracing, room, spawn_camera, spawn_viewer};
use crate::utils::wait_for_camera_status;

#[tokio::test]
async fn test_invalid_code_is_rejected_before_dialing() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let viewer = spawn_viewer(&network);
    viewer.viewer.ready().await.unwrap();

    let err = viewer.viewer.connect("ABC-DEF", None).await.unwrap_err();
    assert_eq!(
        err,
        ConnectError::InvalidRoomId(RoomIdError::SegmentCount { found: 2 })
    );
    assert!(err.to_string().contains("ABC-DEF-GHJ-KLM"));

    let err = viewer.viewer.connect("   ", None).await.unwrap_err();
    assert_eq!(err, ConnectError::InvalidRoomId(RoomIdError::Empty));

    assert!(viewer.viewer.views().is_empty());
    assert_eq!(network.active_calls(), 0);
}

#[tokio::test]
async fn test_second_connect_to_connected_camera_is_rejected() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let camera = spawn_camera(&network, room());
    camera.broadcaster.ready().await.unwrap();
    camera
        .broadcaster
        .start_broadcast(MediaConfig::default())
        .await
        .unwrap();

    let viewer = spawn_viewer(&network);
    viewer.viewer.ready().await.unwrap();
    viewer.viewer.connect(room().as_str(), None).await.unwrap();

    let mut rx = viewer.viewer.subscribe();
    wait_for_camera_status(&mut rx, &room(), CameraStatus::Connected)
        .await
        .unwrap();

    let err = viewer
        .viewer
        .connect("abc-def-ghj-klm", Some("Again".to_owned()))
        .await
        .unwrap_err();
    assert_eq!(err, ConnectError::AlreadyConnected);

    let views = viewer.viewer.views();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].name, "Camera ABC-DEF");
    assert_eq!(views[0].latency, LatencyEstimate::Placeholder);
    assert_eq!(views[0].latency.to_string(), "~100ms");
    assert_eq!(network.dial_count(&PeerId::from(&room())), 1);
}

#[tokio::test]
async fn test_share_url_is_accepted() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let camera = spawn_camera(&network, room());
    camera.broadcaster.ready().await.unwrap();
    let link = camera.broadcaster.share_link();

    let viewer = spawn_viewer(&network);
    viewer.viewer.ready().await.unwrap();
    let view = viewer
        .viewer
        .connect(&link.url, Some("Front door".to_owned()))
        .await
        .unwrap();

    assert_eq!(view.room_id, room());
    assert_eq!(view.name, "Front door");
    assert_eq!(view.status, CameraStatus::Connecting);
    assert!(view.call_id.is_some());
    assert!(view.stream.is_none());
}

#[tokio::test]
async fn test_connect_needs_a_registered_session() {
    init_tracing();

    let network = LoopbackNetwork::new();
    network.set_signaling_available(false);

    let viewer = spawn_viewer(&network);
    assert_eq!(
        viewer.viewer.ready().await.unwrap_err(),
        ConnectError::Session(SessionError::SignalingUnavailable)
    );

    let err = viewer.viewer.connect(room().as_str(), None).await.unwrap_err();
    assert_eq!(err, ConnectError::NotReady);
    assert!(viewer.viewer.views().is_empty());
}
