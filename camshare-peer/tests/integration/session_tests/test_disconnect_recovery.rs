use std::sync::Arc;
use std::time::Duration;

use camshare_core::PeerId;
use camshare_peer::{
    LoopbackNetwork, PeerSession, RetryPolicy, SessionError, SessionStatus, TransportError,
    TransportErrorKind, TransportEvent,
};

use crate::integration::{ROOM, init_tracing};
use crate::utils::{MockTransport, next_state};

#[tokio::test]
async fn test_server_disconnect_reregisters_under_same_address() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let room = PeerId::from(ROOM);
    let mut session = PeerSession::new(
        Arc::new(network.clone()),
        Some(room.clone()),
        RetryPolicy::default(),
    );
    session.open().await.unwrap();
    assert_eq!(next_state(&mut session).await.unwrap().status, SessionStatus::Ready);

    assert!(network.disconnect_peer(&room));
    assert_eq!(
        next_state(&mut session).await.unwrap().status,
        SessionStatus::Disconnected
    );

    let state = next_state(&mut session).await.unwrap();
    assert_eq!(state.status, SessionStatus::Ready);
    assert_eq!(state.peer_id, Some(room.clone()));
    assert!(network.is_registered(&room));
}

#[tokio::test(start_paused = true)]
async fn test_retries_until_signaling_returns() {
    init_tracing();

    let transport = MockTransport::new();
    let mut session = PeerSession::new(
        Arc::new(transport.clone()),
        None,
        RetryPolicy::unbounded(Duration::from_secs(1)),
    );
    session.open().await.unwrap();
    next_state(&mut session).await.unwrap();
    let handle = transport.last_handle();

    transport.set_reconnect_ok(false);
    handle.emit(TransportEvent::Disconnected);
    assert_eq!(
        next_state(&mut session).await.unwrap().status,
        SessionStatus::Disconnected
    );

    // Three failed attempts, one per second; the state stays put.
    let poll = tokio::time::timeout(Duration::from_millis(3500), session.next()).await;
    assert!(poll.is_err(), "no state change while retries keep failing");
    assert_eq!(handle.reconnects(), 3);
    assert_eq!(session.status(), SessionStatus::Disconnected);

    transport.set_reconnect_ok(true);
    let state = next_state(&mut session).await.unwrap();
    assert_eq!(state.status, SessionStatus::Ready);
    assert_eq!(handle.reconnects(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_policy_gives_up_with_signaling_error() {
    init_tracing();

    let transport = MockTransport::new();
    transport.set_reconnect_ok(false);
    let mut session = PeerSession::new(
        Arc::new(transport.clone()),
        None,
        RetryPolicy::limited(2, Duration::from_millis(100)),
    );
    session.open().await.unwrap();
    next_state(&mut session).await.unwrap();
    let handle = transport.last_handle();

    handle.emit(TransportEvent::Disconnected);
    assert_eq!(
        next_state(&mut session).await.unwrap().status,
        SessionStatus::Disconnected
    );

    let state = next_state(&mut session).await.unwrap();
    assert_eq!(state.status, SessionStatus::Errored);
    assert_eq!(state.error, Some(SessionError::SignalingUnavailable));
    assert_eq!(handle.reconnects(), 2);
}

#[tokio::test]
async fn test_peer_unavailable_does_not_error_the_session() {
    init_tracing();

    let transport = MockTransport::new();
    let mut session = PeerSession::new(Arc::new(transport.clone()), None, RetryPolicy::default());
    session.open().await.unwrap();
    next_state(&mut session).await.unwrap();

    let handle = transport.last_handle();
    handle.emit(TransportEvent::Error(TransportError::new(
        TransportErrorKind::PeerUnavailable,
        "could not connect to peer",
    )));
    handle.emit(TransportEvent::Error(TransportError::classify(
        "Lost connection to server (network)",
    )));

    let state = next_state(&mut session).await.unwrap();
    assert_eq!(state.status, SessionStatus::Errored);
    assert_eq!(state.error, Some(SessionError::Network));
}
