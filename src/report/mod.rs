//! Session report module
//!
//! Builds the plain-text artifact summarizing a completed session:
//! - document: sections, rendering and parsing
//! - format: durations, timestamps and config values
//! - writer: atomic write and read back

pub mod document;
pub mod format;
pub mod writer;

pub use document::{ReportGroup, ReportSection, ReportSummary, SessionReport};
pub use writer::{read_report, write_report};

use std::path::PathBuf;
use thiserror::Error;

/// Report-related errors
#[derive(Error, Debug)]
pub enum ReportError {
    /// The artifact could not be written; the recording itself is kept
    #[error("Failed to write report {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid report: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
