//! Daemon configuration data model

use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// The device entry whose name matches an evdev device name exactly.
    pub fn device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|device| device.name == name)
    }
}

/// Global settings
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
    /// Root of the preset tree, `<presets_dir>/<group>/<preset>.json`
    pub presets_dir: PathBuf,
    /// Name of the virtual device that receives injected events
    pub output_name: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            presets_dir: PathBuf::from(shellexpand::tilde(DEFAULT_PRESETS_DIR).into_owned()),
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
        }
    }
}

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/chordmap/config.kdl";
pub const DEFAULT_PRESETS_DIR: &str = "~/.config/chordmap/presets";
pub const DEFAULT_OUTPUT_NAME: &str = "chordmap keyboard + mouse";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive for `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// A physical device to remap and the preset it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Device name to match (from evdev). Also names the preset group.
    pub name: String,
    /// Preset to load from the device's group
    pub preset: String,
}
