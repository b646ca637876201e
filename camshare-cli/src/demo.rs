use anyhow::{Result, bail};
use camshare::PeerId;
use camshare::model::{CameraStatus, RoomId};
use camshare::peer::{
    BroadcastState, Broadcaster, CamshareConfig, LoopbackNetwork, MemoryRegistry,
    SyntheticCapture, Viewer, ViewerState,
};
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Camera and viewer on one loopback network: a call placed before the
/// camera starts, a dropped call and the automatic redial.
pub async fn run(config: &CamshareConfig, late_start: Duration) -> Result<()> {
    let network = LoopbackNetwork::with_config(config.transport.clone());
    let room_id = RoomId::generate();

    println!("{}", "🚀 Starting loopback demo...".green().bold());

    let broadcaster = Broadcaster::spawn(
        room_id.clone(),
        Arc::new(network.clone()),
        Arc::new(SyntheticCapture::new()),
        config,
    );
    broadcaster.ready().await?;
    println!("📷 Camera registered as {}", room_id.as_str().cyan());
    println!("   🔗 {}", broadcaster.share_link().url);

    let viewer = Viewer::spawn(
        Arc::new(network.clone()),
        Arc::new(MemoryRegistry::new()),
        config,
    );
    viewer.ready().await?;

    let typed = room_id.as_str().to_lowercase();
    println!("👀 Viewer dials {}", typed.cyan());
    let view = viewer.connect(&typed, None).await?;
    print_status(&view.name, view.status);

    let mut camera_rx = broadcaster.subscribe();
    wait_camera(&mut camera_rx, |s| s.pending_calls == 1).await?;
    println!("   ⏳ Call queued until the camera starts");

    tokio::time::sleep(late_start).await;
    broadcaster.start_broadcast(config.media.clone()).await?;
    println!("{}", "📦 Camera started".cyan());

    let mut viewer_rx = viewer.subscribe();
    wait_view(&mut viewer_rx, &room_id, CameraStatus::Connected).await?;
    print_status(&view.name, CameraStatus::Connected);
    let state = wait_camera(&mut camera_rx, |s| s.viewer_count == 1).await?;
    println!("   👥 Viewers: {}", state.viewer_count);

    println!("{}", "⚡ Dropping the call".yellow());
    network.interrupt_calls(&PeerId::from(&room_id));
    wait_view(&mut viewer_rx, &room_id, CameraStatus::Disconnected).await?;
    print_status(&view.name, CameraStatus::Disconnected);

    let redial = config.viewer_retry.delay_for(1);
    println!("   ⏳ Redialing in {:?}", redial);
    wait_view(&mut viewer_rx, &room_id, CameraStatus::Connected).await?;
    print_status(&view.name, CameraStatus::Connected);

    viewer.shutdown().await;
    broadcaster.shutdown().await;
    println!("{}", "✨ Demo finished".green().bold());
    Ok(())
}

fn print_status(name: &str, status: CameraStatus) {
    let label = match status {
        CameraStatus::Connected => status.to_string().green(),
        CameraStatus::Connecting => status.to_string().yellow(),
        CameraStatus::Disconnected => status.to_string().dimmed(),
        CameraStatus::Error => status.to_string().red(),
    };
    println!("   {} → {}", name.bold(), label);
}

async fn wait_camera(
    rx: &mut watch::Receiver<BroadcastState>,
    f: impl FnMut(&BroadcastState) -> bool,
) -> Result<BroadcastState> {
    match tokio::time::timeout(STEP_TIMEOUT, rx.wait_for(f)).await {
        Ok(Ok(state)) => Ok(state.clone()),
        Ok(Err(_)) => bail!("Camera stopped unexpectedly"),
        Err(_) => bail!("Timed out waiting for the camera"),
    }
}

async fn wait_view(
    rx: &mut watch::Receiver<ViewerState>,
    room_id: &RoomId,
    status: CameraStatus,
) -> Result<()> {
    let found = tokio::time::timeout(
        STEP_TIMEOUT,
        rx.wait_for(|s| {
            s.cameras
                .iter()
                .any(|c| &c.room_id == room_id && c.status == status)
        }),
    )
    .await;

    match found {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => bail!("Viewer stopped unexpectedly"),
        Err(_) => bail!("Timed out waiting for {}", status),
    }
}
