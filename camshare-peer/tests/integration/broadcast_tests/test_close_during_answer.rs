use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use camshare_core::model::{CameraStatus, MediaConfig};
use camshare_peer::LoopbackNetwork;

use crate::integration::{init_tracing, room, spawn_camera, spawn_viewer};
use crate::utils::wait_for_camera_status;

#[tokio::test]
async fn test_call_closed_while_answering_is_never_counted() {
    init_tracing();

    let network = LoopbackNetwork::new();
    network.set_close_on_answer(true);

    let camera = spawn_camera(&network, room());
    camera.broadcaster.ready().await.unwrap();
    camera
        .broadcaster
        .start_broadcast(MediaConfig::default())
        .await
        .unwrap();

    let max_seen = Arc::new(AtomicUsize::new(0));
    let mut camera_rx = camera.broadcaster.subscribe();
    let watcher = {
        let max_seen = max_seen.clone();
        tokio::spawn(async move {
            while camera_rx.changed().await.is_ok() {
                let count = camera_rx.borrow_and_update().viewer_count;
                max_seen.fetch_max(count, Ordering::SeqCst);
            }
        })
    };

    let viewer = spawn_viewer(&network);
    viewer.viewer.ready().await.unwrap();
    viewer.viewer.connect(room().as_str(), None).await.unwrap();

    let mut viewer_rx = viewer.viewer.subscribe();
    wait_for_camera_status(&mut viewer_rx, &room(), CameraStatus::Disconnected)
        .await
        .unwrap();

    camera.broadcaster.shutdown().await;
    let _ = watcher.await;

    assert_eq!(max_seen.load(Ordering::SeqCst), 0);
    assert_eq!(camera.broadcaster.state().viewer_count, 0);
    viewer.viewer.shutdown().await;
}
