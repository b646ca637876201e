use camshare_core::PeerId;
use camshare_core::model::{CameraStatus, MediaConfig};
use camshare_peer::{CameraRegistry, LoopbackNetwork, StreamDelivery, StreamOrigin};

use crate::integration::{init_tracing, room, spawn_camera, spawn_viewer};
use crate::utils::wait_for_camera_status;

async fn connect_with(delivery: StreamDelivery) {
    let network = LoopbackNetwork::new();
    network.set_stream_delivery(delivery);

    let camera = spawn_camera(&network, room());
    camera.broadcaster.ready().await.unwrap();
    camera
        .broadcaster
        .start_broadcast(MediaConfig::default().with_audio(true))
        .await
        .unwrap();

    let viewer = spawn_viewer(&network);
    viewer.viewer.ready().await.unwrap();
    viewer.viewer.connect(room().as_str(), None).await.unwrap();

    let mut rx = viewer.viewer.subscribe();
    let state = wait_for_camera_status(&mut rx, &room(), CameraStatus::Connected)
        .await
        .unwrap();

    let stream = state.cameras[0].stream.clone().unwrap();
    assert_eq!(stream.origin(), StreamOrigin::Remote);
    assert_eq!(viewer.registry.saved().len(), 1, "saved exactly once");
}

#[tokio::test]
async fn test_stream_event_alone_connects() {
    init_tracing();
    connect_with(StreamDelivery::StreamEvent).await;
}

#[tokio::test]
async fn test_track_event_alone_connects() {
    init_tracing();
    connect_with(StreamDelivery::TrackEvent).await;
}

#[tokio::test]
async fn test_both_events_connect_once() {
    init_tracing();
    connect_with(StreamDelivery::Both).await;
}

#[tokio::test]
async fn test_call_error_marks_camera_failed() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let camera = spawn_camera(&network, room());
    camera.broadcaster.ready().await.unwrap();

    let viewer = spawn_viewer(&network);
    viewer.viewer.ready().await.unwrap();
    viewer.viewer.connect(room().as_str(), None).await.unwrap();

    let mut camera_rx = camera.broadcaster.subscribe();
    crate::utils::wait_for_broadcast(&mut camera_rx, "queued call", |s| s.pending_calls == 1)
        .await
        .unwrap();

    assert_eq!(network.fail_calls(&PeerId::from(&room()), "ICE failed"), 1);

    let mut rx = viewer.viewer.subscribe();
    let state = wait_for_camera_status(&mut rx, &room(), CameraStatus::Error)
        .await
        .unwrap();
    assert_eq!(
        state.cameras[0].last_error.as_deref(),
        Some("failed to connect to camera")
    );
    assert!(state.cameras[0].call_id.is_none());
}

#[tokio::test]
async fn test_dialing_absent_camera_fails() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let viewer = spawn_viewer(&network);
    viewer.viewer.ready().await.unwrap();
    viewer.viewer.connect(room().as_str(), None).await.unwrap();

    let mut rx = viewer.viewer.subscribe();
    wait_for_camera_status(&mut rx, &room(), CameraStatus::Error)
        .await
        .unwrap();
    assert!(viewer.viewer.state().session.is_ready());
}
