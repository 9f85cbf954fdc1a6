//! Virtual device injection via uinput
//!
//! Handlers never touch a uinput device directly. They write into an
//! [`OutputSink`], a cheap cloneable channel handle, and a writer task owns
//! the [`VirtualDevice`] and emits one batch per sync. Every grabbed device
//! gets a forward sink backed by a virtual twin of itself, and all of them
//! share one inject sink backed by the combined keyboard and mouse device.

use anyhow::{Context, Result};
use chordmap_config::InputEvent;
use evdev::{
    uinput::VirtualDeviceBuilder, AbsInfo, AttributeSet, Device, Key, RelativeAxisType,
    UinputAbsSetup,
};
use tokio::sync::mpsc;

/// A command for a writer task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCommand {
    Write {
        event_type: u16,
        code: u16,
        value: i32,
    },
    /// Everything written since the last sync belongs together.
    Sync,
}

/// Write end of a virtual device.
#[derive(Debug, Clone)]
pub struct OutputSink {
    name: String,
    tx: mpsc::UnboundedSender<SinkCommand>,
}

impl OutputSink {
    /// Create a sink and the receiver its writer task consumes.
    pub fn channel(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<SinkCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn write(&self, event_type: u16, code: u16, value: i32) {
        self.send(SinkCommand::Write {
            event_type,
            code,
            value,
        });
    }

    pub fn write_event(&self, event: &InputEvent) {
        self.write(event.event_type(), event.code(), event.value());
    }

    pub fn sync(&self) {
        self.send(SinkCommand::Sync);
    }

    /// Write a single event and sync right away.
    pub fn emit(&self, event_type: u16, code: u16, value: i32) {
        self.write(event_type, code, value);
        self.sync();
    }

    fn send(&self, command: SinkCommand) {
        if self.tx.send(command).is_err() {
            tracing::debug!("Writer of {} is gone, dropping {:?}", self.name, command);
        }
    }
}

/// A virtual input device for injecting events
pub struct VirtualDevice {
    device: evdev::uinput::VirtualDevice,
}

impl VirtualDevice {
    /// Create the shared output device that can produce keys, buttons and
    /// relative motion.
    pub fn new_output(name: &str) -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for code in 1..0x300u16 {
            keys.insert(Key::new(code));
        }

        let mut axes = AttributeSet::<RelativeAxisType>::new();
        for axis in [
            RelativeAxisType::REL_X,
            RelativeAxisType::REL_Y,
            RelativeAxisType::REL_WHEEL,
            RelativeAxisType::REL_HWHEEL,
            RelativeAxisType::REL_WHEEL_HI_RES,
            RelativeAxisType::REL_HWHEEL_HI_RES,
        ] {
            axes.insert(axis);
        }

        let device = VirtualDeviceBuilder::new()?
            .name(name)
            .with_keys(&keys)?
            .with_relative_axes(&axes)?
            .build()
            .with_context(|| format!("Failed to create virtual device '{}'", name))?;

        Ok(Self { device })
    }

    /// Create a virtual twin of a physical device with the same
    /// capabilities, so events nobody maps reach applications unchanged.
    pub fn new_forward(source: &Device) -> Result<Self> {
        let name = format!("chordmap forwarded {}", source.name().unwrap_or("device"));
        let mut builder = VirtualDeviceBuilder::new()?
            .name(&name)
            .input_id(source.input_id());

        if let Some(keys) = source.supported_keys() {
            builder = builder.with_keys(keys)?;
        }
        if let Some(axes) = source.supported_relative_axes() {
            builder = builder.with_relative_axes(axes)?;
        }
        if let Some(axes) = source.supported_absolute_axes() {
            let state = source.get_abs_state()?;
            for axis in axes.iter() {
                if let Some(info) = state.get(axis.0 as usize) {
                    let info = AbsInfo::new(
                        info.value,
                        info.minimum,
                        info.maximum,
                        info.fuzz,
                        info.flat,
                        info.resolution,
                    );
                    builder = builder.with_absolute_axis(&UinputAbsSetup::new(axis, info))?;
                }
            }
        }

        let device = builder
            .build()
            .with_context(|| format!("Failed to create virtual device '{}'", name))?;
        Ok(Self { device })
    }

    /// Emit a batch of events, terminated by a SYN_REPORT.
    pub fn emit(&mut self, events: &[evdev::InputEvent]) -> Result<()> {
        self.device.emit(events)?;
        Ok(())
    }
}

/// Collect commands into batches and emit them on every sync. Runs until all
/// senders are dropped.
pub async fn run_writer(mut device: VirtualDevice, mut rx: mpsc::UnboundedReceiver<SinkCommand>) {
    let mut batch = Vec::new();

    while let Some(command) = rx.recv().await {
        match command {
            SinkCommand::Write {
                event_type,
                code,
                value,
            } => {
                batch.push(evdev::InputEvent::new(
                    evdev::EventType(event_type),
                    code,
                    value,
                ));
            }
            SinkCommand::Sync => {
                if batch.is_empty() {
                    continue;
                }
                if let Err(e) = device.emit(&batch) {
                    tracing::error!("Failed to emit {} event(s): {:#}", batch.len(), e);
                }
                batch.clear();
            }
        }
    }

    tracing::debug!("Writer task finished");
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Drain everything written so far, without syncs.
    pub fn written(rx: &mut mpsc::UnboundedReceiver<SinkCommand>) -> Vec<(u16, u16, i32)> {
        let mut events = Vec::new();
        while let Ok(command) = rx.try_recv() {
            if let SinkCommand::Write {
                event_type,
                code,
                value,
            } = command
            {
                events.push((event_type, code, value));
            }
        }
        events
    }
}
