//! Application settings management

use crate::PathManager;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_MAX_CONCURRENT_IMAGE_REQUESTS: usize = 8;
const DEFAULT_MAX_CONCURRENT_SONG_REQUESTS: usize = 3;

/// Application settings stored in settings.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Upper bound on simultaneous artwork downloads
    pub max_concurrent_image_requests: usize,
    /// Upper bound on simultaneous song downloads
    pub max_concurrent_song_requests: usize,
    /// Where downloaded artwork is stored (defaults to `PathManager::artwork_dir`)
    pub artwork_dir: Option<PathBuf>,
    /// Tracing filter directive, e.g. "info,pony_core=trace"
    pub log_filter: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_image_requests: DEFAULT_MAX_CONCURRENT_IMAGE_REQUESTS,
            max_concurrent_song_requests: DEFAULT_MAX_CONCURRENT_SONG_REQUESTS,
            artwork_dir: None,
            log_filter: None,
        }
    }
}

impl Settings {
    /// Load settings from the settings file, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = PathManager::settings_path() else {
            return Self::default();
        };
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load settings from `path`, failing if it is missing or malformed
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse settings {:?}", path))
    }

    /// Save settings to the settings file
    pub fn save(&self) -> Result<()> {
        let path = PathManager::settings_path().context("Could not determine settings path")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, content).with_context(|| format!("Failed to write settings {:?}", path))?;
        Ok(())
    }
}
