//! chordmap CLI
//!
//! Checks presets and the daemon configuration, and lists what the daemon
//! would work with.

use std::path::{Path, PathBuf};

use chordmap_config::{Config, Preset, PresetDirectory, PresetLookup};
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;

#[derive(Parser, Debug)]
#[command(name = "chordmap")]
#[command(about = "Configuration tool for the chordmap input remapper")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = chordmap_config::DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a preset file
    Validate {
        /// Path to the preset JSON file
        preset: PathBuf,
    },

    /// Validate the daemon configuration file
    CheckConfig,

    /// List available input devices
    Devices,

    /// List the presets of a device, newest first
    Presets {
        /// Device name the presets belong to
        group: String,
    },
}

fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    match cli.command {
        Commands::Validate { preset } => cmd_validate(&preset),
        Commands::CheckConfig => cmd_check_config(&config_path),
        Commands::Devices => cmd_devices(&config_path),
        Commands::Presets { group } => cmd_presets(&config_path, &group),
    }
}

fn cmd_validate(path: &Path) -> miette::Result<()> {
    println!("Validating preset: {}", path.display());

    let mut preset = Preset::with_path(path);
    preset.load().into_diagnostic()?;

    let mut mappings: Vec<_> = preset.iter().collect();
    mappings.sort_by_key(|mapping| mapping.event_combination().json_str());

    let mut invalid = 0;
    for mapping in mappings {
        match mapping.validate() {
            Ok(()) => println!("  ok       {}", mapping.event_combination()),
            Err(e) => {
                invalid += 1;
                println!("  invalid  {}: {}", mapping.event_combination(), e.message);
            }
        }
    }

    if preset.dangerously_mapped_btn_left() {
        println!("\nWarning: BTN_LEFT is mapped away and nothing produces it anymore");
    }

    if invalid > 0 {
        return Err(miette::miette!(
            "{} of {} mapping(s) are invalid and will be skipped",
            invalid,
            preset.len()
        ));
    }
    println!("\nPreset is valid! ({} mapping(s))", preset.len());
    Ok(())
}

fn cmd_check_config(config_path: &Path) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = chordmap_config::parse_config(config_path)?;
    let presets = PresetDirectory::new(config.global.presets_dir.clone());

    println!("Configuration is valid!");
    println!("  Presets: {}", config.global.presets_dir.display());
    println!("  Output device: {}", config.global.output_name);
    println!("  Devices: {}", config.devices.len());
    for device in &config.devices {
        let path = presets.preset_path(&device.name, &device.preset);
        let state = if path.exists() { "" } else { " (missing)" };
        println!("    - {} -> {}{}", device.name, device.preset, state);
    }
    Ok(())
}

/// The config if it can be read, so listings can mark configured devices.
fn load_config(config_path: &Path) -> Option<Config> {
    match chordmap_config::parse_config(config_path) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::debug!("Not using {}: {}", config_path.display(), e);
            None
        }
    }
}

fn cmd_devices(config_path: &Path) -> miette::Result<()> {
    println!("Available input devices:\n");
    let config = load_config(config_path);

    let mut paths: Vec<PathBuf> = std::fs::read_dir("/dev/input")
        .into_diagnostic()?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("event"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    for path in paths {
        // Skip devices we can't open
        let Ok(device) = evdev::Device::open(&path) else {
            continue;
        };
        let name = device.name().unwrap_or("Unknown");
        let id = device.input_id();
        let vendor_product = format!("{:04x}:{:04x}", id.vendor(), id.product());

        let supported = device.supported_events();
        let mut kinds = Vec::new();
        if supported.contains(evdev::EventType::KEY) {
            kinds.push("keys");
        }
        if supported.contains(evdev::EventType::RELATIVE) {
            kinds.push("relative");
        }
        if supported.contains(evdev::EventType::ABSOLUTE) {
            kinds.push("absolute");
        }

        let configured = config
            .as_ref()
            .and_then(|config| config.device(name))
            .map(|device| format!(" -> preset '{}'", device.preset))
            .unwrap_or_default();

        println!("  {} [{}]{}", name, kinds.join(", "), configured);
        println!("    Path: {}", path.display());
        println!("    ID: {}", vendor_product);
        println!();
    }

    Ok(())
}

fn cmd_presets(config_path: &Path, group: &str) -> miette::Result<()> {
    let presets_dir = match load_config(config_path) {
        Some(config) => config.global.presets_dir,
        None => PathBuf::from(shellexpand::tilde(chordmap_config::DEFAULT_PRESETS_DIR).into_owned()),
    };
    let presets = PresetDirectory::new(presets_dir);

    let names = presets.presets(group).into_diagnostic()?;
    if names.is_empty() {
        println!("No presets for '{}' in {}", group, presets.group_dir(group).display());
        return Ok(());
    }

    println!("Presets for '{}', newest first:\n", group);
    for name in names {
        println!("  {}", name);
    }
    Ok(())
}
