//! Configuration management
//!
//! Settings resolve in priority order: command-line flags, then the TOML
//! config file, then compiled defaults. Every key in the file is optional.

use crate::recorder::controller::{ControllerOptions, DEFAULT_STOP_TIMEOUT};
use crate::recorder::state::{
    validate_countdown, validate_timer_duration, SessionSettings, StopMethod,
    DEFAULT_MEDIA_EXTENSION,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How a configured session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StopMode {
    #[default]
    Manual,
    Timer,
}

/// Device names for the two channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraNames {
    #[serde(default = "default_primary_name")]
    pub primary: String,

    #[serde(default = "default_secondary_name")]
    pub secondary: String,
}

impl Default for CameraNames {
    fn default() -> Self {
        Self {
            primary: default_primary_name(),
            secondary: default_secondary_name(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where session files are written
    #[serde(default = "default_save_path")]
    pub save_path: PathBuf,

    #[serde(default)]
    pub stop_mode: StopMode,

    /// Used when `stop_mode` is `timer` (60-3600, multiple of 30)
    #[serde(default = "default_timer_duration_secs")]
    pub timer_duration_secs: u32,

    /// Countdown before the cameras start (0-120)
    #[serde(default)]
    pub countdown_delay_secs: u32,

    /// How long to wait for both cameras to acknowledge a stop
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Extension of the per-camera media files
    #[serde(default = "default_media_extension")]
    pub media_extension: String,

    #[serde(default)]
    pub cameras: CameraNames,
}

fn default_save_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_timer_duration_secs() -> u32 {
    600
}

fn default_stop_timeout_ms() -> u64 {
    DEFAULT_STOP_TIMEOUT.as_millis() as u64
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_media_extension() -> String {
    DEFAULT_MEDIA_EXTENSION.to_string()
}

fn default_primary_name() -> String {
    "LightRoom".to_string()
}

fn default_secondary_name() -> String {
    "DarkRoom".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            save_path: default_save_path(),
            stop_mode: StopMode::default(),
            timer_duration_secs: default_timer_duration_secs(),
            countdown_delay_secs: 0,
            stop_timeout_ms: default_stop_timeout_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            media_extension: default_media_extension(),
            cameras: CameraNames::default(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            tracing::debug!("No config file given, using defaults");
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges with the same rules the controller applies
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stop_mode == StopMode::Timer {
            validate_timer_duration(self.timer_duration_secs)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        validate_countdown(self.countdown_delay_secs)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.stop_timeout_ms == 0 {
            return Err(ConfigError::Invalid("stop_timeout_ms must be positive".to_string()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive".to_string()));
        }
        if self.media_extension.is_empty() || self.media_extension.contains(['.', '/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "media_extension '{}' must be a bare extension such as 'h264'",
                self.media_extension
            )));
        }
        Ok(())
    }

    pub fn stop_method(&self) -> StopMethod {
        match self.stop_mode {
            StopMode::Manual => StopMethod::Manual,
            StopMode::Timer => StopMethod::Timer {
                duration_secs: self.timer_duration_secs,
            },
        }
    }

    /// Session settings for a named session under the configured path
    pub fn session_settings(&self, name: &str) -> SessionSettings {
        let mut settings = SessionSettings::new(name, &self.save_path)
            .with_stop_method(self.stop_method())
            .with_countdown(self.countdown_delay_secs);
        settings.media_extension = self.media_extension.clone();
        settings
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
