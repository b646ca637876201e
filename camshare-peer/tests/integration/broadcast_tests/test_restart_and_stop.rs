use std::time::Duration;

use camshare_core::model::{CameraStatus, MediaConfig, Resolution};
use camshare_peer::{BroadcastError, LoopbackNetwork};

use crate::integration::{init_tracing, room, spawn_camera, spawn_viewer};
use crate::utils::{wait_for_broadcast, wait_for_camera_status};

#[tokio::test]
async fn test_stop_hangs_up_and_releases_camera() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let camera = spawn_camera(&network, room());
    camera.broadcaster.ready().await.unwrap();
    let stream = camera
        .broadcaster
        .start_broadcast(MediaConfig::default())
        .await
        .unwrap();

    let viewer = spawn_viewer(&network);
    viewer.viewer.ready().await.unwrap();
    viewer.viewer.connect(room().as_str(), None).await.unwrap();

    let mut camera_rx = camera.broadcaster.subscribe();
    wait_for_broadcast(&mut camera_rx, "one viewer", |s| s.viewer_count == 1)
        .await
        .unwrap();

    camera.broadcaster.stop_broadcast().await.unwrap();

    let state = camera.broadcaster.state();
    assert_eq!(state.viewer_count, 0);
    assert!(!state.broadcasting);
    assert!(!stream.is_active());
    assert!(camera.capture.live_stream().is_none());

    let mut viewer_rx = viewer.viewer.subscribe();
    wait_for_camera_status(&mut viewer_rx, &room(), CameraStatus::Disconnected)
        .await
        .unwrap();
    viewer.viewer.shutdown().await;
}

#[tokio::test]
async fn test_restart_releases_previous_capture_first() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let camera = spawn_camera(&network, room());
    camera.broadcaster.ready().await.unwrap();

    let first = camera
        .broadcaster
        .start_broadcast(MediaConfig::default())
        .await
        .unwrap();
    let second = camera
        .broadcaster
        .start_broadcast(MediaConfig::default().with_resolution(Resolution::P720))
        .await
        .unwrap();

    assert!(!first.is_active());
    assert!(second.is_active());
    assert_eq!(camera.capture.acquisitions(), 2);
    assert!(camera.broadcaster.state().broadcasting);
}

#[tokio::test(start_paused = true)]
async fn test_newer_start_supersedes_pending_capture() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let camera = spawn_camera(&network, room());
    camera.broadcaster.ready().await.unwrap();
    camera.capture.set_delay(Duration::from_secs(2));

    let first = {
        let broadcaster = camera.broadcaster.clone();
        tokio::spawn(async move { broadcaster.start_broadcast(MediaConfig::default()).await })
    };

    let mut camera_rx = camera.broadcaster.subscribe();
    wait_for_broadcast(&mut camera_rx, "capture in progress", |s| s.starting)
        .await
        .unwrap();

    let second = camera
        .broadcaster
        .start_broadcast(MediaConfig::default())
        .await;

    assert_eq!(first.await.unwrap().unwrap_err(), BroadcastError::Superseded);
    let stream = second.unwrap();
    assert!(stream.is_active());
    assert_eq!(camera.capture.live_stream().map(|s| s.id()), Some(stream.id()));
}
