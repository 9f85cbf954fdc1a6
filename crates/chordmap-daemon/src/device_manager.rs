//! Device management
//!
//! This module provides the `DeviceManager` struct which owns the lifecycle of
//! grabbed devices.
//!
//! # Overview
//!
//! The `DeviceManager` is responsible for:
//! - Matching input devices against the configured device names
//! - Loading the configured preset and building its handler graph
//! - Grabbing the device and creating its virtual forward twin
//! - Spawning the reader and writer tasks of every grabbed device
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use crate::device_manager::DeviceManager;
//!
//! let (output, rx) = OutputSink::channel("output");
//! let mut device_manager = DeviceManager::new(Arc::new(config), output);
//! device_manager.grab_configured_devices()?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chordmap_config::{Config, DeviceConfig, Preset, PresetDirectory, PresetLookup};
use evdev::Device;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::device::{enumerate_devices, event_source, DeviceInfo};
use crate::event_reader::EventReader;
use crate::injector::{run_writer, OutputSink, VirtualDevice};
use crate::mapping_handlers::Context;
use crate::mapping_parser::{parse_mappings, HandlerGraph};

/// A device whose events are being remapped
struct GrabbedDevice {
    info: DeviceInfo,
    preset: String,
    /// Dropping or firing this stops the reader, which releases held keys
    stop: oneshot::Sender<()>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Manages grabbed input devices for the daemon.
///
/// # Fields
///
/// - `config`: The parsed configuration, wrapped in `Arc` for sharing
/// - `presets`: Where preset files are looked up
/// - `output`: Inject sink of the shared virtual output device
/// - `grabbed_devices`: Map from device path to grabbed device state
///
/// # Thread Safety
///
/// The `DeviceManager` itself should be owned by a single task (the main
/// task). Everything it spawns only shares the cloneable `output` sink.
pub struct DeviceManager {
    config: Arc<Config>,
    presets: PresetDirectory,
    output: OutputSink,
    grabbed_devices: HashMap<PathBuf, GrabbedDevice>,
}

impl DeviceManager {
    /// Create a new `DeviceManager` with the given configuration and output
    /// sink.
    ///
    /// # Arguments
    ///
    /// * `config` - The parsed configuration, wrapped in `Arc` for sharing
    /// * `output` - The inject sink shared by all devices
    pub fn new(config: Arc<Config>, output: OutputSink) -> Self {
        let presets = PresetDirectory::new(config.global.presets_dir.clone());
        Self {
            config,
            presets,
            output,
            grabbed_devices: HashMap::new(),
        }
    }

    /// Returns the number of currently grabbed devices.
    pub fn grabbed_count(&self) -> usize {
        self.grabbed_devices.len()
    }

    /// Try every input device and grab the configured ones.
    ///
    /// Failing to grab one device is logged and does not stop the others.
    ///
    /// # Returns
    ///
    /// The number of devices grabbed.
    pub fn grab_configured_devices(&mut self) -> Result<usize> {
        let devices = enumerate_devices().context("Failed to enumerate input devices")?;

        for info in devices {
            if self.config.device(&info.name).is_none() {
                continue;
            }
            if let Err(e) = self.try_grab_device(&info.path) {
                tracing::warn!("Failed to grab device at {}: {:#}", info.path.display(), e);
            }
        }

        Ok(self.grabbed_count())
    }

    /// Try to grab a device at the given path.
    ///
    /// Opens the evdev device, checks if it matches any configured device by
    /// name, and if so, builds the handler graph of its preset, grabs it for
    /// exclusive access and starts processing its events.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the evdev device (e.g., `/dev/input/event3`)
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Device was matched, grabbed, and is being remapped
    /// * `Ok(false)` - Device does not match any configured device (not an error)
    /// * `Err(_)` - Device could not be opened or grabbed, or its preset is broken
    pub fn try_grab_device(&mut self, path: &Path) -> Result<bool> {
        if self.grabbed_devices.contains_key(path) {
            tracing::debug!("Device at {} is already grabbed", path.display());
            return Ok(true);
        }

        let mut device = Device::open(path)
            .with_context(|| format!("Failed to open device at {}", path.display()))?;
        let info = DeviceInfo::from_device(path, &device);

        let device_config = match self.config.device(&info.name) {
            Some(config) => config.clone(),
            None => {
                tracing::debug!(
                    "Device '{}' does not match any configured device, skipping",
                    info.name
                );
                return Ok(false);
            }
        };

        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();
        let context = Context::new(self.output.clone(), feedback_tx);
        let graph = load_handler_graph(&self.presets, &device_config, &context)?;

        let forward_device = VirtualDevice::new_forward(&device)
            .with_context(|| format!("Failed to create forward device for '{}'", info.name))?;

        device.grab().with_context(|| {
            format!(
                "Failed to grab device '{}' for exclusive access. \
                 Is another application using this device?",
                info.name
            )
        })?;

        let events = device.into_event_stream().with_context(|| {
            format!(
                "Failed to create event stream for device '{}' at {}",
                info.name,
                path.display()
            )
        })?;

        let (forward, forward_rx) = OutputSink::channel(format!("{} forwarded", info.name));
        let writer = tokio::spawn(run_writer(forward_device, forward_rx));

        let (stop, stop_rx) = oneshot::channel();
        let reader = EventReader::new(info.clone(), graph, forward);
        let reader = tokio::spawn(reader.run(event_source(events), feedback_rx, stop_rx));

        tracing::info!(
            "Device '{}' ({}) grabbed with preset '{}' (path: {})",
            info.name,
            info.vendor_product(),
            device_config.preset,
            path.display()
        );

        self.grabbed_devices.insert(
            path.to_path_buf(),
            GrabbedDevice {
                info,
                preset: device_config.preset,
                stop,
                reader,
                writer,
            },
        );
        Ok(true)
    }

    /// Release a grabbed device at the given path.
    ///
    /// Stops the reader, which releases everything its handlers hold, and
    /// waits for it. The device is ungrabbed once its event stream is
    /// dropped. Releasing a device that is not grabbed is a no-op.
    pub async fn release_device(&mut self, path: &Path) {
        match self.grabbed_devices.remove(path) {
            Some(grabbed_device) => {
                let name = grabbed_device.info.name.clone();
                let preset = grabbed_device.preset.clone();
                shut_down(grabbed_device).await;
                tracing::info!(
                    "Released device '{}' running '{}' at {}",
                    name,
                    preset,
                    path.display()
                );
            }
            None => {
                tracing::debug!(
                    "Device at {} was not grabbed, nothing to release",
                    path.display()
                );
            }
        }
    }

    /// Release all grabbed devices.
    pub async fn release_all(&mut self) {
        let paths: Vec<PathBuf> = self.grabbed_devices.keys().cloned().collect();
        for path in paths {
            self.release_device(&path).await;
        }
    }
}

async fn shut_down(grabbed_device: GrabbedDevice) {
    let GrabbedDevice {
        info,
        stop,
        reader,
        writer,
        ..
    } = grabbed_device;

    // the reader may already have stopped on its own
    let _ = stop.send(());
    if let Err(e) = reader.await {
        tracing::error!("Reader of '{}' failed: {}", info.name, e);
    }
    // the reader dropped the forward sink, so the writer drains and ends
    if let Err(e) = writer.await {
        tracing::error!("Forward writer of '{}' failed: {}", info.name, e);
    }
}

/// Load the preset configured for a device and build its handler graph.
///
/// The device name doubles as the preset group.
pub fn load_handler_graph(
    presets: &impl PresetLookup,
    device_config: &DeviceConfig,
    context: &Context,
) -> Result<HandlerGraph> {
    let path = presets.preset_path(&device_config.name, &device_config.preset);
    let mut preset = Preset::with_path(&path);
    preset.load().with_context(|| {
        format!(
            "Failed to load preset '{}' for device '{}'",
            device_config.preset, device_config.name
        )
    })?;

    if preset.dangerously_mapped_btn_left() {
        tracing::warn!(
            "Preset '{}' maps the left mouse button away without providing it elsewhere",
            device_config.preset
        );
    }

    let graph = parse_mappings(&preset, context)
        .with_context(|| format!("Failed to build handlers for {}", path.display()))?;
    if graph.is_empty() {
        tracing::warn!("{} has no usable mappings", path.display());
    }
    tracing::info!(
        "Loaded {} mapping(s) from {}",
        preset.len(),
        path.display()
    );
    Ok(graph)
}
