//! Data model and configuration for chordmap
//!
//! This crate holds everything that describes a remapping without running
//! it: input events and combinations, key names, the macro language,
//! mappings and presets with their on-disk layout, and the daemon's KDL
//! configuration.

mod error;
mod event_combination;
mod input_event;
pub mod keys;
mod macros;
mod mapping;
mod model;
mod parser;
mod paths;
mod preset;

pub use error::{
    ConfigError, CreationError, DuplicateCombinationError, MacroParseError, PresetError,
    ValidationError,
};
pub use event_combination::EventCombination;
pub use input_event::*;
pub use macros::{is_macro, Macro, MacroTask};
pub use mapping::{
    defaults, is_analog, Mapping, MappingOutput, MAX_RELEASE_TIMEOUT, TARGET_UINPUTS,
};
pub use model::*;
pub use parser::{parse_config, parse_config_str};
pub use paths::{PresetDirectory, PresetLookup};
pub use preset::{read_mappings, Preset};
