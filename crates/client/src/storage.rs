//! Persistent key/value storage.
//!
//! Values are JSON files in the platform config directory:
//!   - Linux: `~/.config/labgate/`
//!   - macOS: `~/Library/Application Support/labgate/`
//!   - Windows: `%APPDATA%\labgate\`
//!
//! `LABGATE_CONFIG_DIR` overrides the location.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

const APP_DIR: &str = "labgate";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    /// Storage under the platform config directory, if there is one.
    pub fn platform() -> Option<Self> {
        if let Ok(dir) = std::env::var("LABGATE_CONFIG_DIR") {
            return Some(Self::at(dir));
        }
        Some(Self::at(dirs::config_dir()?.join(APP_DIR)))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{safe_key}.json"))
    }

    /// Save a value. Returns `true` if it was written.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let Ok(json) = serde_json::to_string(value) else {
            return false;
        };
        if !self.dir.exists() && std::fs::create_dir_all(&self.dir).is_err() {
            crate::log_warn!("cannot create storage dir {}", self.dir.display());
            return false;
        }
        std::fs::write(self.file_path(key), json).is_ok()
    }

    /// Load a value; `None` if the key is missing or does not deserialize.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = std::fs::read_to_string(self.file_path(key)).ok()?;
        serde_json::from_str(&json).ok()
    }

    pub fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }

    pub fn exists(&self, key: &str) -> bool {
        self.file_path(key).exists()
    }
}
