//! KDL configuration parser

use std::path::Path;

use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl ships its own miette version, rebuild the span for ours
        let span = miette::SourceSpan::from((e.span.offset(), e.span.len()));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            "device" => {
                let device = parse_device(node)?;
                if config.device(&device.name).is_some() {
                    return Err(ConfigError::Invalid {
                        message: format!("Device '{}' is configured twice", device.name),
                    });
                }
                config.devices.push(device);
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

/// First string argument of a node, e.g. `"info"` in `log-level "info"`.
fn first_string(node: &kdl::KdlNode) -> Option<&str> {
    node.entries().first().and_then(|e| e.value().as_string())
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "log-level" => {
                    if let Some(val) = first_string(child) {
                        global.log_level = val
                            .parse()
                            .map_err(|e| ConfigError::Invalid { message: e })?;
                    }
                }
                "presets-dir" => {
                    if let Some(val) = first_string(child) {
                        global.presets_dir = shellexpand::tilde(val).into_owned().into();
                    }
                }
                "output-name" => {
                    if let Some(val) = first_string(child) {
                        if val.trim().is_empty() {
                            return Err(ConfigError::Invalid {
                                message: "output-name must not be empty".to_string(),
                            });
                        }
                        global.output_name = val.to_string();
                    }
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_device(node: &kdl::KdlNode) -> Result<DeviceConfig, ConfigError> {
    let name = first_string(node).ok_or_else(|| ConfigError::MissingField {
        field: "device name (e.g., `device \"My Keyboard\" { ... }`)".to_string(),
    })?;

    let mut preset = None;
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "preset" => {
                    preset = first_string(child).map(str::to_string);
                }
                other => {
                    tracing::warn!("Unknown device config option: {}", other);
                }
            }
        }
    }

    let preset = preset.ok_or_else(|| ConfigError::MissingField {
        field: format!("preset for device '{}' (e.g., `preset \"gaming\"`)", name),
    })?;

    Ok(DeviceConfig {
        name: name.to_string(),
        preset,
    })
}
