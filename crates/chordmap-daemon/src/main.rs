//! chordmap daemon
//!
//! Grabs the configured input devices and remaps their events through the
//! handler graph built from each device's preset.

mod device;
mod device_manager;
mod error;
mod event_reader;
mod injector;
mod macro_executor;
mod mapping_handlers;
mod mapping_parser;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::device_manager::DeviceManager;
use crate::injector::{run_writer, OutputSink, VirtualDevice};

/// How long the output device may take to write the final releases
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "chordmapd")]
#[command(about = "Input remapping daemon with chords, macros and axis conversion")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = chordmap_config::DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&args.config).into_owned().into();
    let config = chordmap_config::parse_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.global.log_level.as_filter())),
        )
        .init();

    tracing::info!(
        "Loaded configuration from {} with {} device(s)",
        config_path.display(),
        config.devices.len()
    );

    let output_device = VirtualDevice::new_output(&config.global.output_name)
        .context("Failed to create the output device")?;
    let (output, output_rx) = OutputSink::channel(config.global.output_name.clone());
    let writer = tokio::spawn(run_writer(output_device, output_rx));

    let mut device_manager = DeviceManager::new(Arc::new(config), output);
    let grabbed = device_manager.grab_configured_devices()?;
    if grabbed == 0 {
        tracing::warn!("None of the configured devices is connected");
    }

    tracing::info!("chordmap daemon running with {} device(s)", grabbed);

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    shut_down(device_manager, writer).await;

    Ok(())
}

/// Release every device, then wait until the output writer has written the
/// releases their handlers emitted on the way out.
async fn shut_down(mut device_manager: DeviceManager, writer: JoinHandle<()>) {
    device_manager.release_all().await;
    // the manager owns the last output sink, the writer ends once it is gone
    drop(device_manager);

    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Output writer failed: {}", e),
        Err(_) => tracing::warn!("Output writer did not finish in time"),
    }
}
