use std::sync::Arc;

use camshare_core::PeerId;
use camshare_peer::{LoopbackNetwork, PeerSession, RetryPolicy, SessionError, SessionStatus};

use crate::integration::{ROOM, init_tracing};
use crate::utils::next_state;

#[tokio::test]
async fn test_second_session_under_same_room_reports_address_taken() {
    init_tracing();

    let network = LoopbackNetwork::new();
    let room = PeerId::from(ROOM);

    let mut first = PeerSession::new(
        Arc::new(network.clone()),
        Some(room.clone()),
        RetryPolicy::default(),
    );
    first.open().await.unwrap();
    let state = next_state(&mut first).await.unwrap();
    assert_eq!(state.status, SessionStatus::Ready);
    assert_eq!(state.peer_id, Some(room.clone()));

    let mut second = PeerSession::new(
        Arc::new(network.clone()),
        Some(room.clone()),
        RetryPolicy::default(),
    );
    second.open().await.unwrap();
    let state = next_state(&mut second).await.unwrap();
    assert_eq!(state.status, SessionStatus::Errored);
    assert_eq!(state.error, Some(SessionError::AddressTaken));

    // Errors stick until the owner reconnects.
    first.close().await;
    assert_eq!(second.status(), SessionStatus::Errored);

    second.reconnect().await.unwrap();
    let state = next_state(&mut second).await.unwrap();
    assert_eq!(state.status, SessionStatus::Ready);
    assert_eq!(state.error, None);
    assert!(network.is_registered(&room));
}

#[tokio::test]
async fn test_unreachable_signaling_is_classified() {
    init_tracing();

    let network = LoopbackNetwork::new();
    network.set_signaling_available(false);

    let mut session = PeerSession::new(Arc::new(network), None, RetryPolicy::default());
    session.open().await.unwrap();

    let state = next_state(&mut session).await.unwrap();
    assert_eq!(state.status, SessionStatus::Errored);
    assert_eq!(state.error, Some(SessionError::SignalingUnavailable));
}
