//! Camera device contract
//!
//! Defines the interface the session controller drives for each of the two
//! camera channels. The hardware behind it is opaque.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors reported by a camera device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Device busy")]
    Busy,

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for DeviceError {
    fn from(error: std::io::Error) -> Self {
        DeviceError::IoError(error.to_string())
    }
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Camera settings captured from a device, keyed by setting name.
///
/// Values stay as JSON so tuples (resolution, frame duration limits) and
/// scalars share one representation. Keys are ordered so reports are stable.
pub type ConfigMap = BTreeMap<String, serde_json::Value>;

/// Trait for camera devices
///
/// Each session owns exactly two devices, one per [`ChannelLabel`]. Calls are
/// awaited by the controller; implementations backed by blocking drivers
/// should move that work onto `spawn_blocking` so both channels can progress
/// at the same time.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Stable identifier of the device (e.g. "cam0")
    fn id(&self) -> &str;

    /// Human readable name shown in reports (e.g. "LightRoom")
    fn name(&self) -> &str;

    /// Start recording to the given output file
    async fn start_recording(&mut self, output_path: &Path) -> DeviceResult<()>;

    /// Stop the current recording
    async fn stop_recording(&mut self) -> DeviceResult<()>;

    /// Current camera settings
    fn snapshot_config(&self) -> ConfigMap;
}

/// The two channels of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLabel {
    Primary,
    Secondary,
}

impl ChannelLabel {
    /// Both labels in camera order
    pub const ALL: [ChannelLabel; 2] = [ChannelLabel::Primary, ChannelLabel::Secondary];

    /// 1-based camera number used in file names and report headers
    pub fn number(self) -> u8 {
        match self {
            ChannelLabel::Primary => 1,
            ChannelLabel::Secondary => 2,
        }
    }

    /// Position of this channel in a `[_; 2]` array
    pub fn index(self) -> usize {
        usize::from(self.number() - 1)
    }

    /// File stem suffix, e.g. `camera_1`
    pub fn file_tag(self) -> String {
        format!("camera_{}", self.number())
    }
}

impl std::fmt::Display for ChannelLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelLabel::Primary => write!(f, "primary"),
            ChannelLabel::Secondary => write!(f, "secondary"),
        }
    }
}
