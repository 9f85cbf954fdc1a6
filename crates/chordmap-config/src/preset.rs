//! In-memory preset with load/save against a JSON file
//!
//! A preset file is a JSON object whose keys are canonical combination
//! strings and whose values are the remaining [`Mapping`] fields:
//!
//! ```json
//! {
//!     "1,30,1+1,48,1": {
//!         "target_uinput": "keyboard",
//!         "output_symbol": "Escape"
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{DuplicateCombinationError, PresetError};
use crate::event_combination::EventCombination;
use crate::input_event::{InputEvent, BTN_LEFT};
use crate::mapping::{Mapping, MappingOutput};

/// Collection of mappings keyed by their combination.
///
/// No two stored combinations are permutations of each other. Lookups accept
/// any permutation of a stored combination.
#[derive(Debug, Clone, Default)]
pub struct Preset {
    mappings: HashMap<EventCombination, Mapping>,
    /// State of the file as of the last load or save.
    saved_mappings: HashMap<EventCombination, Mapping>,
    path: Option<PathBuf>,
}

impl Preset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset bound to `path`. Nothing is read until [`Preset::load`].
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rebind the preset. The saved snapshot is re-read from the new file so
    /// that [`Preset::has_unsaved_changes`] compares against it.
    pub fn set_path(&mut self, path: Option<PathBuf>) {
        if path == self.path {
            return;
        }
        self.path = path;
        self.saved_mappings = match &self.path {
            Some(path) if path.exists() => read_mappings(path),
            _ => HashMap::new(),
        };
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.values()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.mappings != self.saved_mappings
    }

    pub fn is_valid(&self) -> bool {
        self.mappings.values().all(Mapping::is_valid)
    }

    /// The stored key matching `combination` in any order.
    fn stored_key(&self, combination: &EventCombination) -> Option<EventCombination> {
        self.mappings
            .keys()
            .find(|stored| stored.is_permutation_of(combination))
            .cloned()
    }

    pub fn get_mapping(&self, combination: &EventCombination) -> Option<&Mapping> {
        if combination.is_empty() {
            return None;
        }
        let key = self.stored_key(combination)?;
        self.mappings.get(&key)
    }

    /// Mutable access to the output settings of a stored mapping. The
    /// combination itself changes through [`Preset::rename`].
    pub fn get_mapping_mut(&mut self, combination: &EventCombination) -> Option<&mut Mapping> {
        if combination.is_empty() {
            return None;
        }
        let key = self.stored_key(combination)?;
        self.mappings.get_mut(&key)
    }

    /// Insert a mapping. Fails without changes if any permutation of its
    /// combination is already stored.
    pub fn add(&mut self, mapping: Mapping) -> Result<(), DuplicateCombinationError> {
        if let Some(existing) = self.stored_key(mapping.event_combination()) {
            return Err(DuplicateCombinationError {
                combination: existing.json_str(),
            });
        }
        self.mappings
            .insert(mapping.event_combination().clone(), mapping);
        Ok(())
    }

    /// Remove the mapping stored under any permutation of `combination`.
    pub fn remove(&mut self, combination: &EventCombination) -> Option<Mapping> {
        match self.stored_key(combination) {
            Some(key) => self.mappings.remove(&key),
            None => {
                tracing::debug!(
                    "Unable to remove non-existing mapping for {}",
                    combination.json_str()
                );
                None
            }
        }
    }

    /// Move the mapping stored under `old` to `new`.
    ///
    /// Renaming to a permutation of the same combination is allowed. Any
    /// collision with a different mapping leaves the preset untouched.
    pub fn rename(
        &mut self,
        old: &EventCombination,
        new: EventCombination,
    ) -> Result<(), PresetError> {
        let old_key = self
            .stored_key(old)
            .ok_or_else(|| PresetError::NotFound(old.json_str()))?;

        if let Some(existing) = self.stored_key(&new) {
            if existing != old_key {
                return Err(DuplicateCombinationError {
                    combination: existing.json_str(),
                }
                .into());
            }
        }

        if let Some(mut mapping) = self.mappings.remove(&old_key) {
            mapping.set_event_combination(new.clone());
            self.mappings.insert(new, mapping);
        }
        Ok(())
    }

    /// Drop all mappings without touching the file. The preset then reports
    /// unsaved changes if the file had any.
    pub fn empty(&mut self) {
        self.mappings.clear();
    }

    /// Drop all mappings, the saved snapshot and the path.
    pub fn clear(&mut self) {
        self.empty();
        self.saved_mappings.clear();
        self.path = None;
    }

    /// Replace every mapping with the content of the file.
    ///
    /// A file that cannot be read or decoded results in an empty preset;
    /// only a missing file is an error.
    pub fn load(&mut self) -> Result<(), PresetError> {
        let path = self.path.as_deref().ok_or(PresetError::NoPath)?;
        tracing::info!("Loading preset from {}", path.display());

        if !path.exists() {
            return Err(PresetError::Missing(path.to_path_buf()));
        }

        self.saved_mappings = read_mappings(path);
        self.mappings = self.saved_mappings.clone();
        Ok(())
    }

    /// Write the preset if it changed since the last load or save.
    ///
    /// Returns whether the file was written. Invalid mappings are written too,
    /// so a key disabled by leaving its output empty survives. No two stored
    /// combinations are permutations of each other, as `add`, `rename` and
    /// `load` all reject that, so there are no duplicates to skip here.
    pub fn save(&mut self) -> Result<bool, PresetError> {
        let path = self.path.clone().ok_or(PresetError::NoPath)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PresetError::io(parent, e))?;
        }

        if !self.has_unsaved_changes() && path.exists() {
            return Ok(false);
        }

        tracing::info!("Saving preset to {}", path.display());

        let mut json = serde_json::Map::new();
        for mapping in self.mappings.values() {
            json.insert(
                mapping.event_combination().json_str(),
                serde_json::to_value(mapping)?,
            );
        }

        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        serde_json::Value::Object(json).serialize(&mut serializer)?;
        buffer.push(b'\n');

        fs::write(&path, buffer).map_err(|e| PresetError::io(&path, e))?;
        self.saved_mappings = self.mappings.clone();
        Ok(true)
    }

    /// True if a plain left click is remapped while no mapping produces a
    /// left click, which would leave the mouse unusable.
    pub fn dangerously_mapped_btn_left(&self) -> bool {
        let btn_left = EventCombination::from(InputEvent::btn_left());
        if !self.mappings.contains_key(&btn_left) {
            return false;
        }
        !self
            .mappings
            .values()
            .any(|mapping| mapping.output() == Ok(MappingOutput::Key(BTN_LEFT)))
    }
}

/// Read every decodable mapping from a preset file. Problems are logged and
/// the offending entry, or the whole file, is skipped.
pub fn read_mappings(path: &Path) -> HashMap<EventCombination, Mapping> {
    let mut mappings = HashMap::new();

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::error!("Unable to read preset {}: {}", path.display(), e);
            return mappings;
        }
    };

    let entries = match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(serde_json::Value::Object(entries)) => entries,
        Ok(_) => {
            tracing::error!("Preset {} is not a JSON object", path.display());
            return mappings;
        }
        Err(e) => {
            tracing::error!("Unable to decode json file {}: {}", path.display(), e);
            return mappings;
        }
    };

    for (key, body) in entries {
        let combination = match EventCombination::from_string(&key) {
            Ok(combination) => combination,
            Err(e) => {
                tracing::error!("Skipping entry in {}: {}", path.display(), e);
                continue;
            }
        };

        let mapping = match Mapping::from_json(combination, body) {
            Ok(mapping) => mapping,
            Err(e) => {
                tracing::error!("Failed to validate mapping in {}: {}", path.display(), e);
                continue;
            }
        };

        let combination = mapping.event_combination();
        if mappings
            .keys()
            .any(|stored| stored.is_permutation_of(combination))
        {
            tracing::error!(
                "Skipping {} in {}: a permutation of it is already mapped",
                key,
                path.display()
            );
            continue;
        }
        mappings.insert(combination.clone(), mapping);
    }

    mappings
}
