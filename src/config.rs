use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

// -------------- Persisted Configuration --------------

/// The two categories guaranteed to exist even when the catalog file is
/// missing or carries no heading for them.
pub const KITCHEN: &str = "KITCHEN";
pub const MEATS: &str = "MEATS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// The two screen positions a run replays against. Absent until the user has
/// calibrated; immutable input to a run once established.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateMap {
    pub search: Point,
    pub quantity: Point,
}

/// Replay delays in seconds. Persisted values win over defaults per key.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_input_pause")]
    pub input_pause: f64,
    #[serde(default = "default_search_wait")]
    pub search_wait: f64,
    #[serde(default = "default_confirm_wait")]
    pub confirm_wait: f64,
}

fn default_input_pause() -> f64 {
    0.3
}

fn default_search_wait() -> f64 {
    4.0
}

fn default_confirm_wait() -> f64 {
    1.0
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            input_pause: default_input_pause(),
            search_wait: default_search_wait(),
            confirm_wait: default_confirm_wait(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    coordinates: Option<CoordinateMap>,
    #[serde(default)]
    settings: TimingConfig,
}

/// Item names grouped by category, in file order. Rebuilt wholesale on each
/// load and read-only in between.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemCatalog {
    categories: Vec<(String, Vec<String>)>,
}

impl ItemCatalog {
    pub fn empty() -> Self {
        Self {
            categories: vec![(KITCHEN.into(), Vec::new()), (MEATS.into(), Vec::new())],
        }
    }

    /// A `[NAME]` line opens a category (upper-cased); following non-blank
    /// lines belong to it. Lines before the first heading are dropped.
    pub fn parse(text: &str) -> Self {
        let mut catalog = Self::empty();
        let mut current = None;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                let name = line[1..line.len() - 1].to_uppercase();
                current = Some(catalog.ensure_category(&name));
            } else if let Some(index) = current {
                catalog.categories[index].1.push(line.to_string());
            }
        }
        catalog
    }

    fn ensure_category(&mut self, name: &str) -> usize {
        if let Some(index) = self.categories.iter().position(|(n, _)| n == name) {
            return index;
        }
        self.categories.push((name.to_string(), Vec::new()));
        self.categories.len() - 1
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(name, _)| name.as_str())
    }

    pub fn items(&self, category: &str) -> &[String] {
        self.categories
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, items)| items.as_slice())
            .unwrap_or(&[])
    }
}

/// Reads and writes the catalog file and the settings file. Load paths never
/// fail: a missing or malformed resource degrades to empty/default data.
pub struct ConfigStore {
    catalog_path: PathBuf,
    settings_path: PathBuf,
}

impl ConfigStore {
    pub fn new(catalog_path: PathBuf, settings_path: PathBuf) -> Self {
        Self {
            catalog_path,
            settings_path,
        }
    }

    pub fn load_catalog(&self) -> ItemCatalog {
        match fs::read_to_string(&self.catalog_path) {
            Ok(text) => ItemCatalog::parse(&text),
            Err(err) => {
                warn!(
                    "catalog {} unreadable ({err}), starting with an empty catalog",
                    self.catalog_path.display()
                );
                ItemCatalog::empty()
            }
        }
    }

    pub fn load_settings(&self) -> (Option<CoordinateMap>, TimingConfig) {
        let text = match fs::read_to_string(&self.settings_path) {
            Ok(text) => text,
            Err(err) => {
                info!(
                    "settings {} unreadable ({err}), using defaults",
                    self.settings_path.display()
                );
                return (None, TimingConfig::default());
            }
        };
        match serde_json::from_str::<SettingsFile>(&text) {
            Ok(file) => (file.coordinates, file.settings),
            Err(err) => {
                warn!(
                    "settings {} malformed ({err}), using defaults",
                    self.settings_path.display()
                );
                (None, TimingConfig::default())
            }
        }
    }

    pub fn save_settings(
        &self,
        coordinates: &CoordinateMap,
        timing: &TimingConfig,
    ) -> Result<(), ConfigError> {
        let file = SettingsFile {
            coordinates: Some(*coordinates),
            settings: *timing,
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(&self.settings_path, json).map_err(|source| ConfigError::Write {
            path: self.settings_path.clone(),
            source,
        })
    }
}
