use std::path::PathBuf;
use std::sync::OnceLock;

static DATA_DIR_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

const APP_DIR: &str = "pony";

pub struct PathManager;

impl PathManager {
    /// Set a custom data directory (useful for sandboxed or mobile targets
    /// where standard detection fails). Only the first call takes effect.
    pub fn set_data_dir(path: PathBuf) {
        let _ = DATA_DIR_OVERRIDE.set(path);
    }

    pub fn data_dir() -> Option<PathBuf> {
        if let Some(d) = DATA_DIR_OVERRIDE.get() {
            return Some(d.clone());
        }
        dirs::data_dir().map(|d| d.join(APP_DIR))
    }

    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(any(target_os = "android", target_os = "ios"))]
        return Self::data_dir();

        #[cfg(not(any(target_os = "android", target_os = "ios")))]
        dirs::config_dir().map(|d| d.join(APP_DIR))
    }

    /// Downloaded artwork lives with the other persistent data, not in the
    /// cache dir: the OS may purge caches, but artwork is reference counted.
    pub fn artwork_dir() -> Option<PathBuf> {
        Self::data_dir().map(|d| d.join("artwork"))
    }

    pub fn logs_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if let Some(home) = dirs::home_dir() {
                return Some(home.join("Library/Logs/Pony"));
            }
        }
        Self::data_dir().map(|d| d.join("logs"))
    }

    pub fn log_file_path() -> Option<PathBuf> {
        Self::logs_dir().map(|d| d.join("pony.log"))
    }

    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("settings.toml"))
    }
}
