//! Device enumeration and event sources

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chordmap_config::InputEvent;
use evdev::Device;
use futures::stream::{self, Stream};

/// Range reported by an absolute axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsRange {
    pub min: i32,
    pub max: i32,
}

/// Information about an input device
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
    pub vendor: u16,
    pub product: u16,
    /// Ranges of the absolute axes, by axis code
    pub abs_ranges: HashMap<u16, AbsRange>,
}

impl DeviceInfo {
    /// Read name, ids and axis ranges of an opened device.
    pub fn from_device(path: &Path, device: &Device) -> Self {
        let id = device.input_id();
        let mut abs_ranges = HashMap::new();

        if let Some(axes) = device.supported_absolute_axes() {
            match device.get_abs_state() {
                Ok(state) => {
                    for axis in axes.iter() {
                        if let Some(info) = state.get(axis.0 as usize) {
                            abs_ranges.insert(
                                axis.0,
                                AbsRange {
                                    min: info.minimum,
                                    max: info.maximum,
                                },
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Could not read axis ranges of {}: {}", path.display(), e);
                }
            }
        }

        Self {
            path: path.to_path_buf(),
            name: device.name().unwrap_or("Unknown").to_string(),
            vendor: id.vendor(),
            product: id.product(),
            abs_ranges,
        }
    }

    /// Get vendor:product string (e.g., "3434:0361")
    pub fn vendor_product(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor, self.product)
    }

    pub fn abs_range(&self, code: u16) -> Option<AbsRange> {
        self.abs_ranges.get(&code).copied()
    }
}

/// Enumerate all input devices
pub fn enumerate_devices() -> Result<Vec<DeviceInfo>> {
    let mut devices = Vec::new();

    for entry in std::fs::read_dir("/dev/input")? {
        let entry = entry?;
        let path = entry.path();

        // Only look at event* devices
        if !path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false)
        {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => devices.push(DeviceInfo::from_device(&path, &device)),
            Err(e) => {
                tracing::debug!("Could not open {}: {}", path.display(), e);
            }
        }
    }

    devices.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(devices)
}

/// What an event source produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    Input(InputEvent),
    /// The device went away. Nothing follows.
    Disconnected,
}

/// Turn a grabbed device's event stream into a feed of [`SourceEvent`]s that
/// ends with [`SourceEvent::Disconnected`] once reading fails.
pub fn event_source(events: evdev::EventStream) -> impl Stream<Item = SourceEvent> {
    stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        match events.next_event().await {
            Ok(event) => Some((SourceEvent::Input(InputEvent::from_evdev(&event)), Some(events))),
            Err(e) => {
                tracing::info!("Input device stopped producing events: {}", e);
                Some((SourceEvent::Disconnected, None))
            }
        }
    })
}
