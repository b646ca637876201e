mod demo;
mod live;

use anyhow::{Context, Result};
use camshare::model::{RoomId, ShareLink, decode_share_input, default_camera_name};
use camshare::peer::{CameraRegistry, CamshareConfig, JsonFileRegistry};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cargo-camshare")]
#[command(bin_name = "cargo-camshare")]
enum Cli {
    Camshare(CamshareArgs),
}

#[derive(clap::Args)]
struct CamshareArgs {
    /// Configuration file, `camshare.toml` when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a room ID and its share link.
    Generate {
        #[arg(long)]
        origin: Option<String>,
    },

    /// Check a typed or scanned room ID or share link.
    Check { input: String },

    /// Manage the saved camera list.
    Cameras {
        #[arg(long)]
        registry: Option<PathBuf>,

        #[command(subcommand)]
        action: CameraAction,
    },

    /// List the cameras this machine can broadcast from.
    Devices,

    /// Broadcast the local camera through the signaling server.
    Camera {
        /// Room ID to broadcast under, a fresh one when omitted.
        #[arg(long)]
        room: Option<String>,
    },

    /// Watch a camera by room ID or share link.
    Watch { code: String },

    /// Run a camera and a viewer over an in-process network.
    Demo {
        /// Keep the camera off for this many milliseconds after the viewer dials.
        #[arg(long, default_value_t = 500)]
        late_start_ms: u64,
    },
}

#[derive(Subcommand)]
enum CameraAction {
    List,
    Remove { id: String },
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let Cli::Camshare(args) = Cli::parse();

    let config = match &args.config {
        Some(path) => CamshareConfig::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => CamshareConfig::load_or_default(),
    };
    config.validate().context("Invalid configuration")?;

    match args.command {
        Commands::Generate { origin } => {
            let room_id = RoomId::generate();
            let origin = origin.unwrap_or_else(|| config.share.origin.clone());
            let link = ShareLink::new(&origin, &room_id);

            println!("{} {}", "📷 Room ID:".green().bold(), room_id);
            println!("   🔗 {}", link.url);
            println!("   {}", link.text.dimmed());
        }

        Commands::Check { input } => match decode_share_input(&input) {
            Some(room_id) => {
                println!("{} {}", "✔ Valid room ID:".green().bold(), room_id);
                println!("   Saved as \"{}\"", default_camera_name(&room_id));
            }
            None => {
                let hint = RoomId::parse(&input)
                    .err()
                    .map(|e| format!("{} ({})", e.hint(), e))
                    .unwrap_or_else(|| "Invalid room ID".to_owned());
                println!("{} {}", "✘".red().bold(), hint.red());
                std::process::exit(1);
            }
        },

        Commands::Cameras { registry, action } => {
            let path = registry.unwrap_or_else(|| config.registry.path.clone());
            let registry = JsonFileRegistry::with_capacity(path, config.registry.max_entries);
            run_cameras(&registry, action)?;
        }

        Commands::Devices => live::devices().await?,

        Commands::Camera { room } => live::camera(&config, room).await?,

        Commands::Watch { code } => live::watch(&config, &code).await?,

        Commands::Demo { late_start_ms } => {
            demo::run(&config, std::time::Duration::from_millis(late_start_ms)).await?;
        }
    }

    Ok(())
}

fn run_cameras(registry: &JsonFileRegistry, action: CameraAction) -> Result<()> {
    match action {
        CameraAction::List => {
            let cameras = registry.saved();
            if cameras.is_empty() {
                println!("{}", "No saved cameras.".dimmed());
            }
            for camera in cameras {
                println!(
                    "{}  {}  {}",
                    camera.id.as_str().cyan(),
                    camera.name.bold(),
                    camera
                        .last_connected
                        .format("%Y-%m-%d %H:%M")
                        .to_string()
                        .dimmed()
                );
            }
        }

        CameraAction::Remove { id } => {
            let room_id = RoomId::parse(&id).map_err(|e| anyhow::anyhow!(e.hint()))?;
            registry
                .remove(&room_id)
                .with_context(|| format!("Failed to update {}", registry.path().display()))?;
            println!("{} {}", "🗑 Removed".yellow(), room_id);
        }

        CameraAction::Clear => {
            registry
                .clear()
                .with_context(|| format!("Failed to clear {}", registry.path().display()))?;
            println!("{}", "🗑 Saved cameras cleared".yellow());
        }
    }
    Ok(())
}
