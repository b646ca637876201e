pub mod broadcast_tests;
pub mod scenario_tests;

use std::sync::Arc;
use tracing::Level;

use camshare_core::RoomId;
use camshare_peer::{
    Broadcaster, CamshareConfig, LoopbackNetwork, MemoryRegistry, SyntheticCapture, Viewer,
};

pub const ROOM: &str = "ABC-DEF-GHJ-KLM";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn room() -> RoomId {
    RoomId::parse(ROOM).expect("fixture room id is valid")
}

pub struct TestCamera {
    pub broadcaster: Broadcaster,
    pub capture: SyntheticCapture,
}

pub fn spawn_camera(network: &LoopbackNetwork, room_id: RoomId) -> TestCamera {
    let capture = SyntheticCapture::new();
    let broadcaster = Broadcaster::spawn(
        room_id,
        Arc::new(network.clone()),
        Arc::new(capture.clone()),
        &CamshareConfig::default(),
    );
    TestCamera {
        broadcaster,
        capture,
    }
}

pub struct TestViewer {
    pub viewer: Viewer,
    pub registry: MemoryRegistry,
}

pub fn spawn_viewer(network: &LoopbackNetwork) -> TestViewer {
    spawn_viewer_with_registry(network, MemoryRegistry::new())
}

pub fn spawn_viewer_with_registry(
    network: &LoopbackNetwork,
    registry: MemoryRegistry,
) -> TestViewer {
    let viewer = Viewer::spawn(
        Arc::new(network.clone()),
        Arc::new(registry.clone()),
        &CamshareConfig::default(),
    );
    TestViewer { viewer, registry }
}
