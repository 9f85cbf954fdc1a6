//! Where presets live on disk
//!
//! Presets are stored as `<root>/<group>/<preset>.json`, where the group is the
//! name of the input device they belong to.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::PresetError;

/// Resolves preset names and files for a device group.
///
/// Handed to everything that needs to find presets instead of relying on a
/// process-wide registry.
pub trait PresetLookup {
    /// Names of the group's presets, most recently modified first.
    fn presets(&self, group: &str) -> Result<Vec<String>, PresetError>;

    /// File that holds `preset` for `group`.
    fn preset_path(&self, group: &str, preset: &str) -> PathBuf;
}

/// Filesystem implementation of [`PresetLookup`].
#[derive(Debug, Clone)]
pub struct PresetDirectory {
    root: PathBuf,
}

impl PresetDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn group_dir(&self, group: &str) -> PathBuf {
        self.root.join(group)
    }

    /// A name for a new preset in `group` that does not exist yet.
    ///
    /// `copy` appends ` copy` unless the name already is a copy. Taken names
    /// get a trailing number, or have their trailing number incremented.
    pub fn available_preset_name(&self, group: &str, name: &str, copy: bool) -> String {
        let mut name = name.trim().to_string();
        if copy && !is_copy_name(&name) {
            name = format!("{} copy", name);
        }

        if !self.preset_path(group, &name).exists() {
            return name;
        }

        let (base, mut i) = match split_trailing_number(&name) {
            Some((base, number)) => (base.to_string(), number + 1),
            None => (name.clone(), 2),
        };
        while self.preset_path(group, &format!("{} {}", base, i)).exists() {
            i += 1;
        }
        format!("{} {}", base, i)
    }

    /// Delete a preset file, and its group directory once that is empty.
    /// Deleting a preset that does not exist does nothing.
    pub fn delete_preset(&self, group: &str, preset: &str) -> Result<(), PresetError> {
        let path = self.preset_path(group, preset);
        if !path.exists() {
            tracing::debug!("Cannot remove non existing path {}", path.display());
            return Ok(());
        }

        tracing::info!("Removing {}", path.display());
        fs::remove_file(&path).map_err(|e| PresetError::io(&path, e))?;

        let dir = self.group_dir(group);
        let is_empty = fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            tracing::debug!("Removing empty dir {}", dir.display());
            fs::remove_dir(&dir).map_err(|e| PresetError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Rename a preset, picking a free name if `new` is taken. Returns the
    /// name that was used. The renamed file counts as the newest preset.
    pub fn rename_preset(&self, group: &str, old: &str, new: &str) -> Result<String, PresetError> {
        if old == new {
            return Ok(old.to_string());
        }

        let source = self.preset_path(group, old);
        if !source.exists() {
            return Err(PresetError::Missing(source));
        }

        let new = self.available_preset_name(group, new, false);
        let target = self.preset_path(group, &new);
        tracing::info!("Moving {} to {}", source.display(), target.display());
        fs::rename(&source, &target).map_err(|e| PresetError::io(&source, e))?;

        fs::File::options()
            .write(true)
            .open(&target)
            .and_then(|file| file.set_modified(SystemTime::now()))
            .map_err(|e| PresetError::io(&target, e))?;

        Ok(new)
    }

    /// The most recently modified preset as `(group, preset)`, optionally
    /// restricted to one group.
    pub fn find_newest_preset(&self, group: Option<&str>) -> Option<(String, String)> {
        let groups: Vec<String> = match group {
            Some(group) => vec![group.to_string()],
            None => fs::read_dir(&self.root)
                .ok()?
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_dir())
                .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
                .collect(),
        };

        let newest = groups
            .iter()
            .flat_map(|group| {
                preset_files(&self.group_dir(group))
                    .into_iter()
                    .map(move |(name, modified)| (group.clone(), name, modified))
            })
            .max_by_key(|(_, _, modified)| *modified);

        match newest {
            Some((group, preset, _)) => {
                tracing::debug!("The newest preset is {:?} {:?}", group, preset);
                Some((group, preset))
            }
            None => {
                tracing::debug!("No presets found");
                None
            }
        }
    }
}

impl PresetLookup for PresetDirectory {
    fn presets(&self, group: &str) -> Result<Vec<String>, PresetError> {
        let dir = self.group_dir(group);
        fs::create_dir_all(&dir).map_err(|e| PresetError::io(&dir, e))?;

        let mut files = preset_files(&dir);
        files.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(files.into_iter().map(|(name, _)| name).collect())
    }

    fn preset_path(&self, group: &str, preset: &str) -> PathBuf {
        self.group_dir(group).join(format!("{}.json", preset))
    }
}

/// `(name, mtime)` of every `.json` file in `dir`.
fn preset_files(dir: &Path) -> Vec<(String, SystemTime)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
        .filter_map(|path| {
            let name = path.file_stem()?.to_str()?.to_string();
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((name, modified))
        })
        .collect()
}

/// `"gaming copy"` and `"gaming copy 3"` are copies.
fn is_copy_name(name: &str) -> bool {
    let base = match split_trailing_number(name) {
        Some((base, _)) => base,
        None => name,
    };
    base.len() > " copy".len() && base.ends_with(" copy")
}

/// Split `"name 12"` into `("name", 12)`.
fn split_trailing_number(name: &str) -> Option<(&str, u64)> {
    let (base, number) = name.rsplit_once(' ')?;
    if base.is_empty() || number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((base, number.parse().ok()?))
}
