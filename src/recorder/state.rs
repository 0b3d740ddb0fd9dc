//! Recording session state
//!
//! Defines the session state machine states, the session and channel records
//! owned by the controller, and the read-only view handed to presentation code.

use super::channel::{ChannelLabel, ConfigMap};
use super::error::{SessionError, SessionResult};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Shortest allowed timer duration in seconds
pub const TIMER_MIN_SECS: u32 = 60;

/// Longest allowed timer duration in seconds
pub const TIMER_MAX_SECS: u32 = 3600;

/// Timer durations must be a multiple of this many seconds
pub const TIMER_STEP_SECS: u32 = 30;

/// Longest allowed countdown before recording starts
pub const COUNTDOWN_MAX_SECS: u32 = 120;

/// Default extension of the media files written by the cameras
pub const DEFAULT_MEDIA_EXTENSION: &str = "h264";

/// Current state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing requested yet
    Idle,
    /// Destination accepted, waiting for confirmation
    AwaitingDestination,
    /// Counting down before the cameras start
    Countdown,
    /// Both cameras are recording
    Recording,
    /// Stop issued, waiting for both cameras
    Stopping,
    /// Session finished and report produced
    Completed,
    /// Session abandoned before any recording was kept
    Aborted,
}

impl SessionState {
    /// Whether a session in this state carries a start timestamp
    pub fn has_started(self) -> bool {
        matches!(
            self,
            SessionState::Recording | SessionState::Stopping | SessionState::Completed
        )
    }

    /// Completed and Aborted accept no further intents
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingDestination => "awaiting-destination",
            SessionState::Countdown => "countdown",
            SessionState::Recording => "recording",
            SessionState::Stopping => "stopping",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Policy deciding when a recording ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum StopMethod {
    /// Operator stops the recording
    Manual,
    /// Recording stops after a fixed duration
    Timer { duration_secs: u32 },
}

impl StopMethod {
    /// Timer duration, if any
    pub fn timer_duration_secs(self) -> Option<u32> {
        match self {
            StopMethod::Manual => None,
            StopMethod::Timer { duration_secs } => Some(duration_secs),
        }
    }
}

impl Default for StopMethod {
    fn default() -> Self {
        Self::Manual
    }
}

impl std::fmt::Display for StopMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopMethod::Manual => write!(f, "Manual"),
            StopMethod::Timer { .. } => write!(f, "Timer"),
        }
    }
}

/// What actually ended the recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Operator,
    Timer,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Operator => write!(f, "Operator"),
            StopReason::Timer => write!(f, "Timer"),
        }
    }
}

/// Settings for starting a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Session name, used to derive output file names
    pub name: String,

    /// Directory receiving the media files and the session report
    pub save_path: PathBuf,

    /// When the recording ends
    #[serde(default)]
    pub stop_method: StopMethod,

    /// Delay between confirmation and recording start
    #[serde(default)]
    pub countdown_delay_secs: u32,

    /// Extension of the media files (without dot)
    #[serde(default = "default_media_extension")]
    pub media_extension: String,
}

fn default_media_extension() -> String {
    DEFAULT_MEDIA_EXTENSION.to_string()
}

impl SessionSettings {
    pub fn new(name: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            save_path: save_path.into(),
            stop_method: StopMethod::Manual,
            countdown_delay_secs: 0,
            media_extension: default_media_extension(),
        }
    }

    pub fn with_stop_method(mut self, stop_method: StopMethod) -> Self {
        self.stop_method = stop_method;
        self
    }

    pub fn with_countdown(mut self, secs: u32) -> Self {
        self.countdown_delay_secs = secs;
        self
    }

    /// Check the timing parameters.
    ///
    /// Name and path are checked separately against the filesystem when the
    /// start intent arrives.
    pub fn validate(&self) -> SessionResult<()> {
        if let StopMethod::Timer { duration_secs } = self.stop_method {
            validate_timer_duration(duration_secs)?;
        }
        validate_countdown(self.countdown_delay_secs)?;
        if self.media_extension.is_empty() || self.media_extension.contains(['.', '/', '\\']) {
            return Err(SessionError::InvalidSettings(format!(
                "invalid media extension '{}'",
                self.media_extension
            )));
        }
        Ok(())
    }
}

/// Timer durations are 60..=3600 seconds in 30 second steps
pub fn validate_timer_duration(secs: u32) -> SessionResult<()> {
    if !(TIMER_MIN_SECS..=TIMER_MAX_SECS).contains(&secs) {
        return Err(SessionError::InvalidSettings(format!(
            "timer duration {secs}s outside {TIMER_MIN_SECS}..={TIMER_MAX_SECS}s"
        )));
    }
    if secs % TIMER_STEP_SECS != 0 {
        return Err(SessionError::InvalidSettings(format!(
            "timer duration {secs}s is not a multiple of {TIMER_STEP_SECS}s"
        )));
    }
    Ok(())
}

pub fn validate_countdown(secs: u32) -> SessionResult<()> {
    if secs > COUNTDOWN_MAX_SECS {
        return Err(SessionError::InvalidSettings(format!(
            "countdown {secs}s exceeds {COUNTDOWN_MAX_SECS}s"
        )));
    }
    Ok(())
}

/// Something that went wrong on one channel during recording or stopping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChannelIssue {
    /// The camera refused to start
    StartFailed { message: String },
    /// The camera reported an error while stopping
    StopFailed { message: String },
    /// The camera did not acknowledge the stop in time
    StopTimeout { timeout_ms: u64 },
}

impl std::fmt::Display for ChannelIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelIssue::StartFailed { message } => write!(f, "start failed: {message}"),
            ChannelIssue::StopFailed { message } => write!(f, "stop failed: {message}"),
            ChannelIssue::StopTimeout { timeout_ms } => {
                write!(f, "stop not acknowledged within {timeout_ms} ms")
            }
        }
    }
}

/// One camera's recording stream within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraChannel {
    /// Which of the two channels this is
    pub label: ChannelLabel,

    /// Name of the device bound to this channel
    pub device_name: String,

    /// Media file written by the camera
    pub output_file: PathBuf,

    /// Timestamp taken right before the start command
    pub started_at: Option<DateTime<Local>>,

    /// Timestamp taken when the stop was acknowledged (or given up on)
    pub ended_at: Option<DateTime<Local>>,

    /// True when `ended_at` is the controller's estimate, not an acknowledgment
    pub ended_best_effort: bool,

    /// Camera settings right after the start
    pub config_at_start: ConfigMap,

    /// Camera settings after the stop
    pub config_at_stop: ConfigMap,

    /// Failures attached to this channel
    pub issues: Vec<ChannelIssue>,
}

impl CameraChannel {
    fn new(label: ChannelLabel, device_name: String, output_file: PathBuf) -> Self {
        Self {
            label,
            device_name,
            output_file,
            started_at: None,
            ended_at: None,
            ended_best_effort: false,
            config_at_start: ConfigMap::new(),
            config_at_stop: ConfigMap::new(),
            issues: Vec::new(),
        }
    }

    /// File name of the media output, without directory
    pub fn file_name(&self) -> String {
        self.output_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Transient countdown state owned by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownState {
    pub remaining_secs: u32,
    pub cancellable: bool,
}

impl CountdownState {
    pub fn new(secs: u32) -> Self {
        Self {
            remaining_secs: secs,
            cancellable: true,
        }
    }
}

/// A recording session and its two channels
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique id, used to correlate log lines
    pub id: Uuid,

    pub name: String,

    pub save_path: PathBuf,

    pub stop_method: StopMethod,

    pub countdown_delay_secs: u32,

    pub started_at: Option<DateTime<Local>>,

    pub ended_at: Option<DateTime<Local>>,

    pub state: SessionState,

    /// Set once the recording has been stopped
    pub stop_reason: Option<StopReason>,

    /// Primary at index 0, secondary at index 1
    pub channels: [CameraChannel; 2],
}

impl Session {
    /// Create a session in the `Idle` state.
    ///
    /// Output files are derived here and never change afterwards.
    pub fn new(settings: &SessionSettings, device_names: [&str; 2]) -> Self {
        let channels = ChannelLabel::ALL.map(|label| {
            let output_file = media_file_path(
                &settings.save_path,
                &settings.name,
                label,
                &settings.media_extension,
            );
            CameraChannel::new(label, device_names[label.index()].to_string(), output_file)
        });

        Self {
            id: Uuid::new_v4(),
            name: settings.name.clone(),
            save_path: settings.save_path.clone(),
            stop_method: settings.stop_method,
            countdown_delay_secs: settings.countdown_delay_secs,
            started_at: None,
            ended_at: None,
            state: SessionState::Idle,
            stop_reason: None,
            channels,
        }
    }

    pub fn channel(&self, label: ChannelLabel) -> &CameraChannel {
        &self.channels[label.index()]
    }

    pub fn channel_mut(&mut self, label: ChannelLabel) -> &mut CameraChannel {
        &mut self.channels[label.index()]
    }

    /// Path of the session report
    pub fn data_file_path(&self) -> PathBuf {
        data_file_path(&self.save_path, &self.name)
    }

    /// Whole seconds between start and end
    pub fn elapsed_secs(&self) -> Option<u64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds().max(0) as u64),
            _ => None,
        }
    }
}

/// `{save_path}/{name}_camera_{n}.{ext}`
pub fn media_file_path(
    save_path: &Path,
    name: &str,
    label: ChannelLabel,
    extension: &str,
) -> PathBuf {
    save_path.join(format!("{}_{}.{}", name, label.file_tag(), extension))
}

/// `{save_path}/{name}_data.txt`
pub fn data_file_path(save_path: &Path, name: &str) -> PathBuf {
    save_path.join(format!("{name}_data.txt"))
}

/// Read-only projection of the controller for presentation layers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Uuid,
    pub name: String,
    pub state: SessionState,
    pub stop_method: StopMethod,

    /// Seconds left before recording starts, while counting down
    pub countdown_remaining_secs: Option<u32>,

    /// Seconds since recording started
    pub elapsed_secs: Option<u64>,

    /// Seconds until the timer stops the recording
    pub remaining_secs: Option<u64>,

    /// Files that would be overwritten, while awaiting confirmation
    pub overwrite_candidates: Vec<String>,
}
