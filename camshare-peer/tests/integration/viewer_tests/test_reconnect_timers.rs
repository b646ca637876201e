use std::sync::Arc;
use std::time::Duration;

use camshare_core::model::CameraStatus;
use camshare_peer::{
    CallEvent, CamshareConfig, MediaCall, MediaStream, MediaTrack, MemoryRegistry, StreamOrigin,
    TrackKind, TransportError, TransportErrorKind, Viewer,
};

use crate::integration::{ROOM, init_tracing, room};
use crate::utils::{MockTransport, wait_for_camera_status};

fn camera_stream() -> MediaStream {
    MediaStream::new(
        StreamOrigin::Remote,
        vec![MediaTrack::new(TrackKind::Video, "remote camera")],
    )
}

async fn connected_viewer() -> (MockTransport, Viewer) {
    let transport = MockTransport::new();
    let viewer = Viewer::spawn(
        Arc::new(transport.clone()),
        Arc::new(MemoryRegistry::new()),
        &CamshareConfig::default(),
    );
    viewer.ready().await.unwrap();
    viewer.connect(ROOM, None).await.unwrap();

    let call = transport.last_handle().calls()[0].clone();
    call.emit(CallEvent::Stream(camera_stream()));

    let mut rx = viewer.subscribe();
    wait_for_camera_status(&mut rx, &room(), CameraStatus::Connected)
        .await
        .unwrap();
    (transport, viewer)
}

#[tokio::test(start_paused = true)]
async fn test_repeated_close_schedules_a_single_redial() {
    init_tracing();

    let (transport, viewer) = connected_viewer().await;
    let handle = transport.last_handle();
    let call = handle.calls()[0].clone();

    call.emit(CallEvent::Closed);
    call.emit(CallEvent::Closed);

    let mut rx = viewer.subscribe();
    let state = wait_for_camera_status(&mut rx, &room(), CameraStatus::Disconnected)
        .await
        .unwrap();
    assert!(state.cameras[0].stream.is_none());
    assert!(state.cameras[0].call_id.is_none());

    tokio::time::sleep(Duration::from_millis(2900)).await;
    assert_eq!(handle.calls().len(), 1, "no redial before the delay");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.calls().len(), 2, "exactly one redial after 3s");
    assert_eq!(
        viewer.view(&room()).unwrap().status,
        CameraStatus::Connecting
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.calls().len(), 2, "closes did not stack timers");
}

#[tokio::test(start_paused = true)]
async fn test_events_of_superseded_call_are_ignored() {
    init_tracing();

    let (transport, viewer) = connected_viewer().await;
    let handle = transport.last_handle();
    let old_call = handle.calls()[0].clone();

    old_call.emit(CallEvent::Closed);
    tokio::time::sleep(Duration::from_secs(4)).await;
    let new_call = handle.calls()[1].clone();

    old_call.emit(CallEvent::Stream(camera_stream()));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let view = viewer.view(&room()).unwrap();
    assert_eq!(view.status, CameraStatus::Connecting);
    assert_eq!(view.call_id, Some(new_call.id()));

    new_call.emit(CallEvent::Stream(camera_stream()));
    let mut rx = viewer.subscribe();
    wait_for_camera_status(&mut rx, &room(), CameraStatus::Connected)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_removing_camera_cancels_pending_redial() {
    init_tracing();

    let (transport, viewer) = connected_viewer().await;
    let handle = transport.last_handle();
    handle.calls()[0].emit(CallEvent::Closed);

    let mut rx = viewer.subscribe();
    wait_for_camera_status(&mut rx, &room(), CameraStatus::Disconnected)
        .await
        .unwrap();

    viewer.disconnect(&room()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(handle.calls().len(), 1);
    assert!(viewer.views().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_replaces_pending_redial() {
    init_tracing();

    let (transport, viewer) = connected_viewer().await;
    let handle = transport.last_handle();
    handle.calls()[0].emit(CallEvent::Closed);

    let mut rx = viewer.subscribe();
    wait_for_camera_status(&mut rx, &room(), CameraStatus::Disconnected)
        .await
        .unwrap();

    viewer.connect(ROOM, None).await.unwrap();
    assert_eq!(handle.calls().len(), 2);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_call_error_does_not_redial() {
    init_tracing();

    let (transport, viewer) = connected_viewer().await;
    let handle = transport.last_handle();
    let call = handle.calls()[0].clone();
    call.emit(CallEvent::Error(TransportError::classify(
        "negotiation failed",
    )));

    let mut rx = viewer.subscribe();
    wait_for_camera_status(&mut rx, &room(), CameraStatus::Error)
        .await
        .unwrap();
    assert!(call.is_closed());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_redial_keeps_retrying() {
    init_tracing();

    let (transport, viewer) = connected_viewer().await;
    let handle = transport.last_handle();
    handle.calls()[0].emit(CallEvent::Closed);

    tokio::time::sleep(Duration::from_millis(3100)).await;
    assert_eq!(handle.calls().len(), 2);
    handle.calls()[1].emit(CallEvent::Error(TransportError::classify(
        "negotiation failed",
    )));

    let mut rx = viewer.subscribe();
    wait_for_camera_status(&mut rx, &room(), CameraStatus::Error)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(3100)).await;
    assert_eq!(handle.calls().len(), 3, "a failed redial schedules the next one");
    assert_eq!(
        viewer.view(&room()).unwrap().status,
        CameraStatus::Connecting
    );

    handle.calls()[2].emit(CallEvent::Stream(camera_stream()));
    wait_for_camera_status(&mut rx, &room(), CameraStatus::Connected)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_camera_is_redialed() {
    init_tracing();

    let (transport, viewer) = connected_viewer().await;
    let handle = transport.last_handle();
    viewer.connect(ROOM, None).await.unwrap();
    assert_eq!(handle.calls().len(), 2);

    handle.calls()[1].emit(CallEvent::Error(TransportError::new(
        TransportErrorKind::PeerUnavailable,
        format!("could not connect to peer {ROOM}"),
    )));

    let mut rx = viewer.subscribe();
    let state = wait_for_camera_status(&mut rx, &room(), CameraStatus::Error)
        .await
        .unwrap();
    assert!(state.cameras[0].last_error.is_some());

    tokio::time::sleep(Duration::from_millis(3100)).await;
    assert_eq!(handle.calls().len(), 3);
}
