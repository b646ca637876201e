use std::sync::Arc;

use camshare_core::PeerId;
use camshare_peer::{LoopbackNetwork, PeerSession, RetryPolicy, SessionStatus, placeholder_stream};
use tokio::sync::mpsc;

use crate::integration::{ROOM, init_tracing};
use crate::utils::{next_signal, next_state};

#[tokio::test]
async fn test_close_releases_calls_and_registration() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let room = PeerId::from(ROOM);

    let mut camera = PeerSession::new(
        Arc::new(network.clone()),
        Some(room.clone()),
        RetryPolicy::default(),
    );
    camera.open().await.unwrap();
    next_state(&mut camera).await.unwrap();

    let mut viewer = PeerSession::new(Arc::new(network.clone()), None, RetryPolicy::default());
    viewer.open().await.unwrap();
    next_state(&mut viewer).await.unwrap();

    let (tx, mut call_events) = mpsc::unbounded_channel();
    viewer.call(&room, placeholder_stream(), tx).await.unwrap();
    assert!(matches!(
        next_signal(&mut camera).await.unwrap(),
        camshare_peer::SessionSignal::Incoming(_)
    ));
    assert_eq!(network.active_calls(), 1);

    camera.close().await;
    camera.close().await;

    assert_eq!(camera.status(), SessionStatus::Closed);
    assert!(!network.is_registered(&room));
    assert_eq!(network.active_calls(), 0);
    assert!(matches!(
        call_events.recv().await,
        Some((_, camshare_peer::CallEvent::Closed))
    ));
}

#[tokio::test]
async fn test_call_requires_ready_session() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let session = PeerSession::new(Arc::new(network), None, RetryPolicy::default());

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = session
        .call(&PeerId::from(ROOM), placeholder_stream(), tx)
        .await
        .err()
        .expect("calling before open must fail");
    assert_eq!(err.kind, camshare_peer::TransportErrorKind::Network);
}
