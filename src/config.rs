//! Persistent settings (`framestream.json`).
//!
//! Every field has a default, so partial or older files load fine. CLI flags
//! are applied on top after loading.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::{LoaderConfig, TransportConfig};

pub const SETTINGS_FILE: &str = "framestream.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    /// Scheduled fetches in flight at once
    pub concurrency: usize,
    pub section_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    pub max_retries: u32,
    pub max_cached_frames: usize,
    /// Fraction of available memory the frame cache may use (0.1 - 0.95)
    pub mem_fraction: f64,
    /// Memory kept free for the system
    pub reserve_gb: f64,
    /// Sections per page requested from the host
    pub page_size: usize,
    /// Fetch/decode threads (0 = auto)
    pub fetch_workers: usize,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            concurrency: 2,
            section_timeout_ms: 10_000,
            fetch_timeout_ms: 30_000,
            max_retries: 2,
            max_cached_frames: 2000,
            mem_fraction: 0.75,
            reserve_gb: 2.0,
            page_size: 500,
            fetch_workers: 0,
        }
    }
}

impl LoaderSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn mem_fraction(&self) -> f64 {
        self.mem_fraction.clamp(0.1, 0.95)
    }

    /// Worker count with 0 resolved to half the cores (at least 2).
    pub fn fetch_workers(&self) -> usize {
        if self.fetch_workers == 0 {
            (num_cpus::get() / 2).max(2)
        } else {
            self.fetch_workers
        }
    }
}

impl From<&LoaderSettings> for LoaderConfig {
    fn from(s: &LoaderSettings) -> Self {
        Self {
            concurrency: s.concurrency.max(1),
            max_retries: s.max_retries,
            max_cached_frames: s.max_cached_frames.max(1),
            section_timeout: Duration::from_millis(s.section_timeout_ms),
        }
    }
}

impl From<&LoaderSettings> for TransportConfig {
    fn from(s: &LoaderSettings) -> Self {
        Self {
            loader: LoaderConfig::from(s),
            fetch_workers: s.fetch_workers(),
            page_size: s.page_size.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Used when an item has no fps of its own
    pub default_fps: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self { default_fps: 24.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub loader: LoaderSettings,
    pub playback: PlaybackSettings,
}

impl Settings {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        info!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        debug!("Settings saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "loader": { "concurrency": 4 } }"#).unwrap();
        assert_eq!(settings.loader.concurrency, 4);
        assert_eq!(settings.loader.section_timeout_ms, 10_000);
        assert_eq!(settings.playback.default_fps, 24.0);
    }

    #[test]
    fn test_into_transport_config() {
        let settings = LoaderSettings {
            concurrency: 0,
            fetch_workers: 3,
            page_size: 50,
            section_timeout_ms: 250,
            ..LoaderSettings::default()
        };
        let config = TransportConfig::from(&settings);
        assert_eq!(config.loader.concurrency, 1);
        assert_eq!(config.loader.section_timeout, Duration::from_millis(250));
        assert_eq!(config.fetch_workers, 3);
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("framestream_settings_{}.json", std::process::id()));
        let mut settings = Settings::default();
        settings.playback.default_fps = 30.0;
        settings.save(&path).unwrap();

        assert_eq!(Settings::load(&path).unwrap(), settings);
        let _ = std::fs::remove_file(&path);

        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }
}
