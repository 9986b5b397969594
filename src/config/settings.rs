//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`.
//! Every section is `#[serde(default)]`, so a partial `settings.toml` fills
//! the gaps with defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::CaptureConstraints;

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Preferences passed to the input device on every `start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Input device name.  `None` means the system default.
    pub device_name: Option<String>,
    /// Preferred sample rate in Hz.  `None` keeps the device default.
    pub sample_rate: Option<u32>,
    /// Preferred channel count.  `None` keeps the device default.
    pub channels: Option<u16>,
}

impl CaptureConfig {
    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            device_name: self.device_name.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Initial output level, `0.0 – 1.0`.
    pub volume: f32,
    /// Output device name.  `None` means the system default.
    pub output_device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            output_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Overrides [`AppPaths::recordings_dir`].
    pub recordings_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use voice_capture::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Where exported recordings go: the configured override or the
    /// platform default.
    pub fn recordings_dir(&self, paths: &AppPaths) -> PathBuf {
        self.storage
            .recordings_dir
            .clone()
            .unwrap_or_else(|| paths.recordings_dir.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert!(cfg.capture.device_name.is_none());
        assert!(cfg.capture.sample_rate.is_none());
        assert!(cfg.capture.channels.is_none());
        assert_eq!(cfg.playback.volume, 1.0);
        assert!(cfg.playback.output_device.is_none());
        assert!(cfg.storage.recordings_dir.is_none());
    }

    /// Non-default values survive a save/load cycle.
    #[test]
    fn modified_values_survive_save_and_load() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("settings.toml");

        let mut cfg = AppConfig::default();
        cfg.capture.device_name = Some("USB Microphone".into());
        cfg.capture.sample_rate = Some(48_000);
        cfg.capture.channels = Some(2);
        cfg.playback.volume = 0.25;
        cfg.storage.recordings_dir = Some(dir.path().join("takes"));

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[playback]\nvolume = 0.5\n").unwrap();

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.playback.volume, 0.5);
        assert!(loaded.playback.output_device.is_none());
        assert_eq!(loaded.capture, CaptureConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[capture\nsample_rate = ").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn capture_section_becomes_constraints() {
        let capture = CaptureConfig {
            device_name: Some("mic".into()),
            sample_rate: Some(16_000),
            channels: Some(1),
        };
        let constraints = capture.constraints();

        assert_eq!(constraints.device_name.as_deref(), Some("mic"));
        assert_eq!(constraints.sample_rate, Some(16_000));
        assert_eq!(constraints.channels, Some(1));
    }

    #[test]
    fn recordings_dir_override_wins() {
        let paths = AppPaths::new();
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.recordings_dir(&paths), paths.recordings_dir);

        cfg.storage.recordings_dir = Some(PathBuf::from("/tmp/takes"));
        assert_eq!(cfg.recordings_dir(&paths), PathBuf::from("/tmp/takes"));
    }
}
