//! Destination commands

use crate::config::AppConfig;
use crate::recorder::destination::{existing_outputs, validate_destination};
use crate::utils::error::AppResult;
use serde::Serialize;
use std::path::PathBuf;

/// What a session with this name would write, and what it would replace
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationCheck {
    pub name: String,
    pub save_path: PathBuf,
    pub output_files: Vec<String>,
    pub overwrite_candidates: Vec<String>,
}

/// Validate a session name against the configured save path
pub fn check_destination(config: &AppConfig, name: &str) -> AppResult<DestinationCheck> {
    let settings = config.session_settings(name);
    settings.validate()?;
    validate_destination(&settings.save_path, &settings.name)?;

    let session = crate::recorder::Session::new(&settings, ["", ""]);
    let mut output_files: Vec<String> = session.channels.iter().map(|c| c.file_name()).collect();
    if let Some(data_file) = session.data_file_path().file_name() {
        output_files.push(data_file.to_string_lossy().into_owned());
    }

    let overwrite_candidates = existing_outputs(&settings);
    tracing::info!(
        "Destination {:?} ok for '{}', {} file(s) at risk",
        settings.save_path,
        name,
        overwrite_candidates.len()
    );

    Ok(DestinationCheck {
        name: settings.name,
        save_path: settings.save_path,
        output_files,
        overwrite_candidates,
    })
}
