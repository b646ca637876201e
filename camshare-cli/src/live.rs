use anyhow::{Context, Result};
use camshare::model::{CameraStatus, RoomId};
use camshare::peer::{
    Broadcaster, CamshareConfig, JsonFileRegistry, MediaCapture, Viewer, WebRtcTransport,
};
use colored::*;
use std::sync::Arc;

fn transport(config: &CamshareConfig) -> Result<Arc<WebRtcTransport>> {
    let transport = WebRtcTransport::new(config.transport.clone())
        .context("Failed to set up the WebRTC transport")?;
    Ok(Arc::new(transport))
}

#[cfg(feature = "camera")]
fn capture() -> Arc<dyn MediaCapture> {
    Arc::new(camshare::peer::NokhwaCapture::new())
}

#[cfg(not(feature = "camera"))]
fn capture() -> Arc<dyn MediaCapture> {
    tracing::warn!("Built without the `camera` feature, sending a synthetic stream");
    Arc::new(camshare::peer::SyntheticCapture::new())
}

pub async fn devices() -> Result<()> {
    let devices = capture()
        .devices()
        .await
        .context("Failed to list cameras")?;
    if devices.is_empty() {
        println!("{}", "No cameras found.".dimmed());
    }
    for device in devices {
        println!("{}  {}", device.device_id.cyan(), device.label.bold());
    }
    Ok(())
}

/// Broadcasts the local camera until Ctrl-C.
pub async fn camera(config: &CamshareConfig, room: Option<String>) -> Result<()> {
    let room_id = match room {
        Some(room) => RoomId::parse(&room).map_err(|e| anyhow::anyhow!(e.hint()))?,
        None => RoomId::generate(),
    };

    let broadcaster = Broadcaster::spawn(room_id.clone(), transport(config)?, capture(), config);
    broadcaster.ready().await?;

    let link = broadcaster.share_link();
    println!("{} {}", "📷 Room ID:".green().bold(), room_id);
    println!("   🔗 {}", link.url);

    broadcaster.start_broadcast(config.media.clone()).await?;
    println!(
        "{} {}",
        "📦 Broadcasting at".cyan(),
        config.media.resolution
    );

    let mut state_rx = broadcaster.subscribe();
    let mut viewers = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                if state.viewer_count != viewers {
                    viewers = state.viewer_count;
                    println!("   👥 Viewers: {}", viewers);
                }
                if let Some(error) = state.last_error.filter(|_| !state.broadcasting) {
                    println!("{} {}", "✘".red().bold(), error.red());
                    break;
                }
            }
        }
    }

    broadcaster.shutdown().await;
    println!("{}", "👋 Camera stopped".yellow());
    Ok(())
}

/// Watches the camera behind `code` until Ctrl-C, printing its status.
pub async fn watch(config: &CamshareConfig, code: &str) -> Result<()> {
    let registry = JsonFileRegistry::with_capacity(
        config.registry.path.clone(),
        config.registry.max_entries,
    );
    let viewer = Viewer::spawn(transport(config)?, Arc::new(registry), config);
    viewer.ready().await?;

    let view = viewer.connect(code, None).await?;
    let room_id = view.room_id.clone();
    println!("👀 Watching {} ({})", view.name.bold(), room_id.as_str().cyan());

    let mut state_rx = viewer.subscribe();
    let mut last = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(view) = state_rx
                    .borrow_and_update()
                    .cameras
                    .iter()
                    .find(|c| c.room_id == room_id)
                    .cloned()
                else {
                    break;
                };
                if last == Some(view.status) {
                    continue;
                }
                last = Some(view.status);

                let label = match view.status {
                    CameraStatus::Connected => view.status.to_string().green(),
                    CameraStatus::Connecting => view.status.to_string().yellow(),
                    CameraStatus::Disconnected => view.status.to_string().dimmed(),
                    CameraStatus::Error => view.status.to_string().red(),
                };
                let tracks = view.stream.as_ref().map_or(0, |s| s.tracks().len());
                println!("   {} → {} ({} tracks)", view.name.bold(), label, tracks);
            }
        }
    }

    viewer.shutdown().await;
    Ok(())
}
