//! Error types and handling
//!
//! Common error types used across the application.

use crate::recorder::SessionError;
use crate::report::ReportError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Error response for presentation layers
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Session(err) => match err {
                SessionError::InvalidDestination(_) => "INVALID_DESTINATION",
                SessionError::InvalidSettings(_) => "INVALID_SETTINGS",
                SessionError::OverwriteRisk { .. } => "OVERWRITE_RISK",
                SessionError::ChannelBusy { .. } => "CHANNEL_BUSY",
                SessionError::PartialStartFailure { .. } => "PARTIAL_START_FAILURE",
                SessionError::InvalidTransition { .. } => "INVALID_TRANSITION",
                SessionError::Report(_) => "REPORT_WRITE_FAILURE",
            },
            AppError::Report(ReportError::Write { .. }) => "REPORT_WRITE_FAILURE",
            AppError::Report(_) => "REPORT_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
