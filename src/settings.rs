//! Layered JSON settings.
//!
//! Every recognized key is a field of [`Settings`]. A [`SettingsLoader`]
//! merges an ordered list of JSON files on top of the defaults; a key in a
//! later file replaces the same key from an earlier one. Keys that
//! [`Settings`] does not know are ignored with a warning.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::model::{MaskRef, TrainingPair};
use crate::error::{Error, Result};
use crate::labels::LabelStandard;

/// File names read from each `settings/` directory, in merge order.
pub const SETTING_FILES: [&str; 4] = [
    "config.json",
    "training_sets.json",
    "data_structure.json",
    "input_files.json",
];

/// Every key a settings file may set.
pub const KNOWN_KEYS: [&str; 17] = [
    "data_source_folder",
    "timestamp_length",
    "sat_file_structure",
    "label_file_structure",
    "difference_vectors",
    "original_values",
    "samples",
    "hours",
    "input_channels",
    "cloudtype_channel",
    "nwcsaf_in_version",
    "nwcsaf_out_version",
    "verbose",
    "training_sets",
    "mask",
    "neighborhood_radius",
    "seed",
];

/// Literal marker in file name templates where the timestamp appears.
pub const TIMESTAMP_PLACEHOLDER: &str = "TIMESTAMP";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Coding standard of incoming labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputStandard {
    /// Detect per label array.
    Auto,
    V2013,
    V2018,
}

impl InputStandard {
    pub fn fixed(self) -> Option<LabelStandard> {
        match self {
            InputStandard::Auto => None,
            InputStandard::V2013 => Some(LabelStandard::V2013),
            InputStandard::V2018 => Some(LabelStandard::V2018),
        }
    }
}

impl From<LabelStandard> for InputStandard {
    fn from(standard: LabelStandard) -> Self {
        match standard {
            LabelStandard::V2013 => InputStandard::V2013,
            LabelStandard::V2018 => InputStandard::V2018,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folder scanned for satellite/label pairs.
    pub data_source_folder: Option<PathBuf>,
    /// Width of the timestamp in file names.
    pub timestamp_length: usize,
    /// Satellite file name template containing `TIMESTAMP`.
    pub sat_file_structure: String,
    /// Label file name template containing `TIMESTAMP`.
    pub label_file_structure: String,
    /// Express neighborhoods relative to their center cell.
    pub difference_vectors: bool,
    /// Keep absolute values next to difference vectors.
    pub original_values: bool,
    /// Samples drawn per training pair and hour.
    pub samples: usize,
    /// Hour offsets (0–23) read from every file.
    pub hours: Vec<usize>,
    pub input_channels: Vec<String>,
    pub cloudtype_channel: String,
    pub nwcsaf_in_version: InputStandard,
    pub nwcsaf_out_version: LabelStandard,
    pub verbose: bool,
    pub training_sets: Vec<TrainingPair>,
    pub mask: Option<MaskRef>,
    /// Half-width of the square window sampled around each cell; 0 reads
    /// the cell only.
    pub neighborhood_radius: usize,
    /// Seed for reproducible sampling; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_source_folder: None,
            timestamp_length: 12,
            sat_file_structure: "msevi_TIMESTAMP.nc".to_string(),
            label_file_structure: "nwcsaf_TIMESTAMP.nc".to_string(),
            difference_vectors: false,
            original_values: true,
            samples: 100,
            hours: vec![0],
            input_channels: ["bt062", "bt073", "bt087", "bt097", "bt108", "bt120", "bt134"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cloudtype_channel: "CT".to_string(),
            nwcsaf_in_version: InputStandard::Auto,
            nwcsaf_out_version: LabelStandard::V2018,
            verbose: false,
            training_sets: Vec::new(),
            mask: None,
            neighborhood_radius: 0,
            seed: None,
        }
    }
}

impl Settings {
    /// Reject combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.input_channels.is_empty() {
            return Err(Error::Configuration("input_channels must not be empty".into()));
        }
        if self.samples == 0 {
            return Err(Error::Configuration("samples must be at least 1".into()));
        }
        if let Some(hour) = self.hours.iter().find(|&&h| h > 23) {
            return Err(Error::Configuration(format!("hour {hour} is outside 0-23")));
        }
        if self.timestamp_length == 0 {
            return Err(Error::Configuration("timestamp_length must be at least 1".into()));
        }
        if self.difference_vectors && self.neighborhood_radius == 0 {
            return Err(Error::Configuration(
                "difference_vectors needs neighborhood_radius > 0".into(),
            ));
        }
        Ok(())
    }

    fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::Configuration("settings did not serialize to an object".into())),
        }
    }

    /// Write the settings into `path`.
    ///
    /// An existing file keeps its structure: only keys already present and
    /// known are overwritten, anything else in it is preserved. A new file
    /// receives every known key.
    pub fn save(&self, path: &Path) -> Result<()> {
        let current = self.to_map()?;
        let doc = if path.exists() {
            let mut saved = read_object(path)?;
            for (key, value) in saved.iter_mut() {
                if let Some(new) = current.get(key) {
                    *value = new.clone();
                }
            }
            saved
        } else {
            current
        };
        let text = serde_json::to_string_pretty(&Value::Object(doc))?;
        fs::write(path, text).map_err(|e| Error::io(path, e))?;
        log::debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Write the settings into the `settings/` files under `dir`.
    ///
    /// Only existing files are updated; when none exists, `config.json` is
    /// created with every known key. Returns the known keys no existing file
    /// holds, which are therefore not saved.
    pub fn save_dir(&self, dir: &Path) -> Result<Vec<&'static str>> {
        let settings_dir = dir.join("settings");
        let existing: Vec<PathBuf> = SETTING_FILES
            .iter()
            .map(|f| settings_dir.join(f))
            .filter(|p| p.exists())
            .collect();
        if existing.is_empty() {
            fs::create_dir_all(&settings_dir).map_err(|e| Error::io(&settings_dir, e))?;
            self.save(&settings_dir.join(SETTING_FILES[0]))?;
            return Ok(Vec::new());
        }

        let mut held = Vec::new();
        for path in &existing {
            held.extend(read_object(path)?.into_iter().map(|(key, _)| key));
            self.save(path)?;
        }
        let unsaved: Vec<&'static str> = KNOWN_KEYS
            .iter()
            .copied()
            .filter(|key| !held.iter().any(|h| h == key))
            .collect();
        if !unsaved.is_empty() {
            log::warn!(
                "No settings file under {} holds {unsaved:?}; those values were not saved",
                settings_dir.display()
            );
        }
        Ok(unsaved)
    }
}

fn read_object(path: &Path) -> Result<Map<String, Value>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    match serde_json::from_str(&text)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Configuration(format!(
            "{} must hold a JSON object",
            path.display()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Ordered list of settings files; later files take precedence.
#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    sources: Vec<PathBuf>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults directory first, then the working directory.
    pub fn layered(defaults_dir: &Path, working_dir: &Path) -> Self {
        Self::new().with_dir(defaults_dir).with_dir(working_dir)
    }

    /// Append `dir/settings/<file>` for every standard settings file.
    pub fn with_dir(mut self, dir: &Path) -> Self {
        let settings_dir = dir.join("settings");
        self.sources
            .extend(SETTING_FILES.iter().map(|f| settings_dir.join(f)));
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(path.into());
        self
    }

    /// Merge all sources over the built-in defaults.
    pub fn load(&self) -> Result<Settings> {
        self.load_onto(&Settings::default())
    }

    /// Merge all sources over `base`. Missing files are skipped.
    pub fn load_onto(&self, base: &Settings) -> Result<Settings> {
        let mut merged = base.to_map()?;
        for path in &self.sources {
            if !path.exists() {
                log::debug!("Settings file {} not present, skipping", path.display());
                continue;
            }
            for (key, value) in read_object(path)? {
                if KNOWN_KEYS.contains(&key.as_str()) {
                    merged.insert(key, value);
                } else {
                    log::warn!("Ignoring unknown settings key '{key}' in {}", path.display());
                }
            }
        }
        serde_json::from_value(Value::Object(merged))
            .map_err(|e| Error::Configuration(format!("invalid settings: {e}")))
    }
}
