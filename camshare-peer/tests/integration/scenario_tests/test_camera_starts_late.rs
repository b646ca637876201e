use std::time::Duration;

use camshare_core::PeerId;
use camshare_core::model::{CameraStatus, MediaConfig};
use camshare_peer::LoopbackNetwork;

use crate::integration::{init_tracing, room, spawn_camera, spawn_viewer};
use crate::utils::{wait_for_broadcast, wait_for_camera_status};

#[tokio::test(start_paused = true)]
async fn test_call_placed_before_broadcast_is_answered_later() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let camera = spawn_camera(&network, room());
    camera.broadcaster.ready().await.unwrap();

    let viewer = spawn_viewer(&network);
    viewer.viewer.ready().await.unwrap();
    viewer.viewer.connect(room().as_str(), None).await.unwrap();

    let mut camera_rx = camera.broadcaster.subscribe();
    let state = wait_for_broadcast(&mut camera_rx, "queued call", |s| s.pending_calls == 1)
        .await
        .unwrap();
    assert_eq!(state.viewer_count, 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        viewer.viewer.view(&room()).unwrap().status,
        CameraStatus::Connecting
    );

    camera
        .broadcaster
        .start_broadcast(MediaConfig::default())
        .await
        .unwrap();

    let mut viewer_rx = viewer.viewer.subscribe();
    wait_for_camera_status(&mut viewer_rx, &room(), CameraStatus::Connected)
        .await
        .unwrap();
    let state = wait_for_broadcast(&mut camera_rx, "answered", |s| s.viewer_count == 1)
        .await
        .unwrap();
    assert_eq!(state.pending_calls, 0);
    assert_eq!(network.dial_count(&PeerId::from(&room())), 1);
}
