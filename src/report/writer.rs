//! Session report read/write operations

use super::document::SessionReport;
use super::ReportError;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Write a report to `path`.
///
/// The text goes to a temp file in the same directory first and is then moved
/// into place, so a failed write never leaves a truncated report behind.
pub fn write_report(report: &SessionReport, path: &Path) -> Result<(), ReportError> {
    let write_err = |source: std::io::Error| ReportError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(report.render().as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    tracing::debug!("Wrote session report to {:?}", path);

    Ok(())
}

/// Read and parse a report from disk
pub fn read_report(path: &Path) -> Result<SessionReport, ReportError> {
    if !path.is_file() {
        return Err(ReportError::Parse(format!(
            "report not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path)?;
    let report = SessionReport::parse(&content)?;

    tracing::debug!("Loaded report with {} sections from {:?}", report.sections.len(), path);

    Ok(report)
}
