//! Configuration management for castpair
//!
//! Handles config file loading/saving and endpoint selection.
//! Config is stored at ~/.config/castpair/config.toml

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::cast::DEFAULT_BASE_URL;
use crate::stream::StreamerConfig;

/// Environment variable overriding the API endpoint
pub const API_URL_ENV: &str = "CAST_API_URL";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cast API base URL
    pub api_base_url: String,
    /// Seconds between registration attempts
    pub registration_retry_secs: u64,
    /// Seconds between credential polls
    pub poll_interval_secs: u64,
    /// Seconds each slide stays on screen
    pub slide_interval_secs: u64,
    /// Largest file (bytes) the slideshow will fetch
    pub max_file_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            registration_retry_secs: 10,
            poll_interval_secs: 2,
            slide_interval_secs: 10,
            max_file_size: crate::stream::MAX_FILE_SIZE,
        }
    }
}

impl Config {
    /// Get config file path (~/.config/castpair/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("castpair").join("config.toml"))
    }

    /// Load config from the default path, or return defaults if not found
    pub fn load() -> Self {
        Self::path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    /// Load config from a specific file, or return defaults
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Resolve the API URL with fallback chain:
    /// 1. Explicit override (CLI flag)
    /// 2. Environment variable CAST_API_URL
    /// 3. Config file value
    pub fn api_url(&self, override_url: Option<&str>) -> String {
        if let Some(url) = override_url {
            return url.to_string();
        }
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.is_empty() {
                return url;
            }
        }
        self.api_base_url.clone()
    }

    pub fn registration_retry(&self) -> Duration {
        Duration::from_secs(self.registration_retry_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn streamer(&self) -> StreamerConfig {
        StreamerConfig {
            slide_interval: Duration::from_secs(self.slide_interval_secs),
            max_file_size: self.max_file_size,
        }
    }
}
