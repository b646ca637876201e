use camshare_core::model::{CameraStatus, MediaConfig};
use camshare_peer::LoopbackNetwork;

use crate::integration::{init_tracing, room, spawn_camera, spawn_viewer};
use crate::utils::{wait_for_broadcast, wait_for_camera_status};

#[tokio::test]
async fn test_calls_before_start_are_queued_then_answered() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let camera = spawn_camera(&network, room());
    camera.broadcaster.ready().await.unwrap();

    let first = spawn_viewer(&network);
    let second = spawn_viewer(&network);
    for v in [&first, &second] {
        v.viewer.ready().await.unwrap();
        v.viewer.connect(room().as_str(), None).await.unwrap();
    }

    let mut camera_rx = camera.broadcaster.subscribe();
    let state = wait_for_broadcast(&mut camera_rx, "two queued calls", |s| s.pending_calls == 2)
        .await
        .unwrap();
    assert_eq!(state.viewer_count, 0);
    assert!(!state.broadcasting);

    camera
        .broadcaster
        .start_broadcast(MediaConfig::default())
        .await
        .unwrap();

    let state = wait_for_broadcast(&mut camera_rx, "both viewers answered", |s| {
        s.viewer_count == 2
    })
    .await
    .unwrap();
    assert_eq!(state.pending_calls, 0);
    assert_eq!(state.viewers.len(), 2);
    assert!(state.broadcasting);

    for v in [&first, &second] {
        let mut rx = v.viewer.subscribe();
        wait_for_camera_status(&mut rx, &room(), CameraStatus::Connected)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_viewer_count_follows_hangups() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let camera = spawn_camera(&network, room());
    camera.broadcaster.ready().await.unwrap();
    camera
        .broadcaster
        .start_broadcast(MediaConfig::default())
        .await
        .unwrap();

    let first = spawn_viewer(&network);
    let second = spawn_viewer(&network);
    for v in [&first, &second] {
        v.viewer.ready().await.unwrap();
        v.viewer.connect(room().as_str(), None).await.unwrap();
    }

    let mut camera_rx = camera.broadcaster.subscribe();
    wait_for_broadcast(&mut camera_rx, "two viewers", |s| s.viewer_count == 2)
        .await
        .unwrap();

    first.viewer.disconnect(&room()).await.unwrap();
    let state = wait_for_broadcast(&mut camera_rx, "one viewer left", |s| s.viewer_count == 1)
        .await
        .unwrap();
    assert_eq!(state.viewers.len(), 1);
}

#[tokio::test]
async fn test_hung_up_calls_leave_the_queue() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let camera = spawn_camera(&network, room());
    camera.broadcaster.ready().await.unwrap();
    let mut camera_rx = camera.broadcaster.subscribe();

    let viewer = spawn_viewer(&network);
    viewer.viewer.ready().await.unwrap();

    for _ in 0..5 {
        viewer.viewer.connect(room().as_str(), None).await.unwrap();
        wait_for_broadcast(&mut camera_rx, "call queued", |s| s.pending_calls == 1)
            .await
            .unwrap();

        viewer.viewer.disconnect(&room()).await.unwrap();
        wait_for_broadcast(&mut camera_rx, "call dropped", |s| s.pending_calls == 0)
            .await
            .unwrap();
    }

    camera
        .broadcaster
        .start_broadcast(MediaConfig::default())
        .await
        .unwrap();
    let state = camera.broadcaster.state();
    assert!(state.broadcasting);
    assert_eq!(state.pending_calls, 0);
    assert_eq!(state.viewer_count, 0);
}
