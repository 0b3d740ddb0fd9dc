//! Report commands

use crate::report::{read_report, ReportSummary, SessionReport};
use crate::utils::error::AppResult;
use serde::Serialize;
use std::path::Path;

/// A parsed session artifact
#[derive(Debug, Clone, Serialize)]
pub struct InspectedReport {
    pub summary: ReportSummary,
    pub report: SessionReport,
}

/// Load a session report and extract its summary
pub fn inspect_report(path: &Path) -> AppResult<InspectedReport> {
    tracing::info!("Inspecting report {:?}", path);

    let report = read_report(path)?;
    let summary = report.summary()?;

    Ok(InspectedReport { summary, report })
}
