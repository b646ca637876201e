use std::sync::Arc;

use camshare_core::PeerId;
use camshare_peer::{LoopbackNetwork, PeerSession, RetryPolicy, SessionSignal, placeholder_stream};
use tokio::sync::mpsc;

use crate::integration::{ROOM, init_tracing};
use crate::utils::{next_signal, next_state};

#[tokio::test]
async fn test_inbound_call_surfaces_as_incoming_signal() {
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
    let viewer_id = next_state(&mut viewer).await.unwrap().peer_id.unwrap();

    let (tx, _rx) = mpsc::unbounded_channel();
    let outgoing = viewer.call(&room, placeholder_stream(), tx).await.unwrap();

    match next_signal(&mut camera).await.unwrap() {
        SessionSignal::Incoming(call) => {
            assert_eq!(call.id(), outgoing.id());
            assert_eq!(call.remote_peer(), &viewer_id);
        }
        SessionSignal::State(state) => panic!("unexpected state change: {state:?}"),
    }
}
