use std::sync::Arc;
use std::time::Duration;

use camshare_core::PeerId;
use camshare_peer::{
    PeerSession, RetryPolicy, SessionError, SessionStatus, TransportConfig, WebRtcTransport,
};

use crate::integration::{ROOM, init_tracing};
use crate::utils::{MockSignalingServer, next_state};

fn transport(server: &MockSignalingServer) -> Arc<WebRtcTransport> {
    Arc::new(WebRtcTransport::new(server.transport_config()).unwrap())
}

#[tokio::test]
async fn test_session_registers_with_the_signaling_server() {
    init_tracing();

    let server = MockSignalingServer::start().await.unwrap();
    let room = PeerId::from(ROOM);

    let mut camera = PeerSession::new(
        transport(&server),
        Some(room.clone()),
        RetryPolicy::default(),
    );
    camera.open().await.unwrap();
    let state = next_state(&mut camera).await.unwrap();
    assert_eq!(state.status, SessionStatus::Ready);
    assert_eq!(state.peer_id, Some(room.clone()));
    assert!(server.is_registered(ROOM));

    let mut viewer = PeerSession::new(transport(&server), None, RetryPolicy::default());
    viewer.open().await.unwrap();
    let viewer_id = next_state(&mut viewer).await.unwrap().peer_id.unwrap();
    assert!(server.is_registered(viewer_id.as_str()));

    camera.close().await;
    assert_eq!(camera.status(), SessionStatus::Closed);
}

#[tokio::test]
async fn test_taken_room_reports_address_taken() {
    init_tracing();

    let server = MockSignalingServer::start().await.unwrap();
    let room = PeerId::from(ROOM);

    let mut first = PeerSession::new(
        transport(&server),
        Some(room.clone()),
        RetryPolicy::default(),
    );
    first.open().await.unwrap();
    assert_eq!(next_state(&mut first).await.unwrap().status, SessionStatus::Ready);

    let mut second = PeerSession::new(
        transport(&server),
        Some(room.clone()),
        RetryPolicy::default(),
    );
    second.open().await.unwrap();
    let state = next_state(&mut second).await.unwrap();
    assert_eq!(state.status, SessionStatus::Errored);
    assert_eq!(state.error, Some(SessionError::AddressTaken));

    // The socket closing after the rejection must not turn into a retry.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(second.status(), SessionStatus::Errored);
}

#[tokio::test]
async fn test_unreachable_server_is_classified() {
    init_tracing();

    // Nothing listens on the discard port.
    let config = TransportConfig {
        signaling_url: "ws://127.0.0.1:9/peerjs".to_owned(),
        ice_servers: vec![],
        ..Default::default()
    };
    let transport = Arc::new(WebRtcTransport::new(config).unwrap());

    let mut session = PeerSession::new(transport, None, RetryPolicy::default());
    session.open().await.unwrap();
    let state = next_state(&mut session).await.unwrap();
    assert_eq!(state.status, SessionStatus::Errored);
    assert_eq!(state.error, Some(SessionError::SignalingUnavailable));
}

#[tokio::test]
async fn test_dropped_socket_reconnects_under_the_same_room() {
    init_tracing();

    let server = MockSignalingServer::start().await.unwrap();
    let room = PeerId::from(ROOM);

    let mut camera = PeerSession::new(
        transport(&server),
        Some(room.clone()),
        RetryPolicy::unbounded(Duration::from_millis(200)),
    );
    camera.open().await.unwrap();
    assert_eq!(next_state(&mut camera).await.unwrap().status, SessionStatus::Ready);

    assert!(server.kick(ROOM));
    let state = next_state(&mut camera).await.unwrap();
    assert_eq!(state.status, SessionStatus::Disconnected);
    assert_eq!(state.peer_id, Some(room.clone()));

    let state = next_state(&mut camera).await.unwrap();
    assert_eq!(state.status, SessionStatus::Ready);
    assert_eq!(state.peer_id, Some(room));
    assert!(server.is_registered(ROOM));
}
