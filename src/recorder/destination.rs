//! Save destination checks
//!
//! Validates the session name and save directory before a session leaves
//! `Idle`, and finds existing files that a session would overwrite.

use super::channel::ChannelLabel;
use super::error::{SessionError, SessionResult};
use super::state::{data_file_path, media_file_path, SessionSettings};
use std::path::Path;

/// Check that `name` can be used as a file stem and `save_path` is a
/// writable directory.
///
/// Names may not contain path separators, `:` or control characters.
/// Writability is checked with an anonymous temp file, so nothing is left
/// behind in the directory.
pub fn validate_destination(save_path: &Path, name: &str) -> SessionResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SessionError::InvalidDestination(
            "session name is empty".to_string(),
        ));
    }
    if trimmed != name {
        return Err(SessionError::InvalidDestination(format!(
            "session name '{name}' has leading or trailing whitespace"
        )));
    }
    if name.contains(['/', '\\', ':']) || name.chars().any(char::is_control) {
        return Err(SessionError::InvalidDestination(format!(
            "session name {name:?} contains a reserved character"
        )));
    }
    if name == "." || name == ".." {
        return Err(SessionError::InvalidDestination(format!(
            "session name '{name}' is not a valid file name"
        )));
    }

    if !save_path.exists() {
        return Err(SessionError::InvalidDestination(format!(
            "save path {} does not exist",
            save_path.display()
        )));
    }
    if !save_path.is_dir() {
        return Err(SessionError::InvalidDestination(format!(
            "save path {} is not a directory",
            save_path.display()
        )));
    }
    tempfile::tempfile_in(save_path).map_err(|e| {
        SessionError::InvalidDestination(format!(
            "save path {} is not writable: {}",
            save_path.display(),
            e
        ))
    })?;

    Ok(())
}

/// File names in the save directory that this session would overwrite.
///
/// Covers both media files and the session data file.
pub fn existing_outputs(settings: &SessionSettings) -> Vec<String> {
    let mut candidates: Vec<_> = ChannelLabel::ALL
        .iter()
        .map(|label| {
            media_file_path(
                &settings.save_path,
                &settings.name,
                *label,
                &settings.media_extension,
            )
        })
        .collect();
    candidates.push(data_file_path(&settings.save_path, &settings.name));

    candidates
        .into_iter()
        .filter(|path| path.exists())
        .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect()
}
