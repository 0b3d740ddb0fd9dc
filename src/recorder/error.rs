//! Session controller errors

use super::channel::{ChannelLabel, DeviceError};
use super::state::SessionState;
use crate::report::ReportError;
use thiserror::Error;

/// Errors surfaced by the session controller
#[derive(Error, Debug)]
pub enum SessionError {
    /// Bad save path or session name; the caller can re-prompt
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// Timing or format parameters out of range
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Output files already exist and need an explicit confirm or cancel
    #[error("Files would be overwritten: {}", files.join(", "))]
    OverwriteRisk { files: Vec<String> },

    /// A camera is still held by a stop that never finished
    #[error("{channel} camera is still busy finishing its last stop")]
    ChannelBusy { channel: ChannelLabel },

    /// At least one camera failed to start; the session was aborted
    #[error("Failed to start {}: {}", describe_failures(failures), first_message(failures))]
    PartialStartFailure {
        failures: Vec<(ChannelLabel, DeviceError)>,
    },

    /// The intent is not accepted in the current state
    #[error("Cannot {intent} while {state}")]
    InvalidTransition {
        state: SessionState,
        intent: &'static str,
    },

    /// The session completed but its report could not be written
    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

impl SessionError {
    /// Channels named by a start failure
    pub fn failed_channels(&self) -> Vec<ChannelLabel> {
        match self {
            SessionError::PartialStartFailure { failures } => {
                failures.iter().map(|(label, _)| *label).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn describe_failures(failures: &[(ChannelLabel, DeviceError)]) -> String {
    failures
        .iter()
        .map(|(label, _)| format!("{label} camera"))
        .collect::<Vec<_>>()
        .join(" and ")
}

fn first_message(failures: &[(ChannelLabel, DeviceError)]) -> String {
    failures
        .first()
        .map(|(_, err)| err.to_string())
        .unwrap_or_default()
}

/// Result type for controller operations
pub type SessionResult<T> = Result<T, SessionError>;
