//! Session report document
//!
//! A report is a list of titled sections, each holding `Key: Value` fields and
//! optional indented groups (camera configuration snapshots). The same
//! structure is produced from a [`Session`] and recovered by [`SessionReport::parse`].

use super::format::{
    format_config_value, format_hms, format_timer_duration, format_timestamp, parse_hms,
    DATE_TIME_FORMAT, TIME_FORMAT, UNKNOWN,
};
use super::ReportError;
use crate::recorder::channel::{ChannelLabel, ConfigMap};
use crate::recorder::state::{CameraChannel, Session};
use serde::{Deserialize, Serialize};

const BANNER: &str = "============================================================";
const RULE: &str = "------------------------------------------------------------";
const TITLE: &str = "RECORDING SESSION DATA";
const FOOTER: &str = "End of session data";

pub const SESSION_SECTION: &str = "SESSION INFORMATION";
pub const TIMING_SECTION: &str = "TIMING INFORMATION";
pub const PARAMETERS_SECTION: &str = "RECORDING PARAMETERS";

/// Field keys shared by the builder and the parser
pub mod keys {
    pub const SESSION_NAME: &str = "Session Name";
    pub const SAVE_PATH: &str = "Save Path";
    pub const START_DATE_TIME: &str = "Start Date/Time";
    pub const END_DATE_TIME: &str = "End Date/Time";
    pub const TOTAL_DURATION: &str = "Total Duration";
    pub const ELAPSED_SECONDS: &str = "Elapsed Seconds";
    pub const STOP_METHOD: &str = "Stop Method";
    pub const STOPPED_BY: &str = "Stopped By";
    pub const TIMER_DURATION: &str = "Timer Duration";
    pub const RECORDING_DELAY: &str = "Recording Delay (Countdown)";
    pub const CHANNEL: &str = "Channel";
    pub const VIDEO_FILE: &str = "Video File";
    pub const START_TIME: &str = "Start Time";
    pub const END_TIME: &str = "End Time";
    pub const END_TIME_STATUS: &str = "End Time Status";
    pub const ISSUE: &str = "Issue";
    pub const CONFIG_AT_START: &str = "Camera Configuration (at start)";
    pub const CONFIG_AT_STOP: &str = "Camera Configuration (at stop)";
}

/// Indented `key: value` block under a heading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportGroup {
    pub title: String,
    pub entries: Vec<(String, String)>,
}

/// One titled section of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    pub fields: Vec<(String, String)>,
    pub groups: Vec<ReportGroup>,
}

impl ReportSection {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fields: Vec::new(),
            groups: Vec::new(),
        }
    }

    fn field(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    fn group(&mut self, title: &str, config: &ConfigMap) -> &mut Self {
        self.groups.push(ReportGroup {
            title: title.to_string(),
            entries: config
                .iter()
                .map(|(k, v)| (k.clone(), format_config_value(v)))
                .collect(),
        });
        self
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value stored under `key`, in order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn group_named(&self, title: &str) -> Option<&ReportGroup> {
        self.groups.iter().find(|g| g.title == title)
    }
}

/// Summary fields recovered from a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub session_name: String,
    pub save_path: String,
    pub total_duration: String,
    pub elapsed_secs: u64,
    pub stop_method: String,
    pub camera_files: [String; 2],
}

/// Structured session artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub sections: Vec<ReportSection>,
}

/// Header of a camera section, e.g. `CAMERA 1 (LightRoom)`
pub fn camera_section_title(channel: &CameraChannel) -> String {
    format!("CAMERA {} ({})", channel.label.number(), channel.device_name)
}

fn camera_section_prefix(label: ChannelLabel) -> String {
    format!("CAMERA {} (", label.number())
}

impl SessionReport {
    /// Build the report for a session.
    ///
    /// Deterministic: the only time values come from timestamps already
    /// stored on the session and its channels.
    pub fn from_session(session: &Session) -> Self {
        let mut sections = Vec::with_capacity(5);

        let mut info = ReportSection::new(SESSION_SECTION);
        info.field(keys::SESSION_NAME, session.name.clone())
            .field(keys::SAVE_PATH, session.save_path.display().to_string());
        sections.push(info);

        let elapsed = session.elapsed_secs();
        let mut timing = ReportSection::new(TIMING_SECTION);
        timing
            .field(keys::START_DATE_TIME, format_timestamp(session.started_at, DATE_TIME_FORMAT))
            .field(keys::END_DATE_TIME, format_timestamp(session.ended_at, DATE_TIME_FORMAT))
            .field(
                keys::TOTAL_DURATION,
                elapsed.map(format_hms).unwrap_or_else(|| UNKNOWN.to_string()),
            )
            .field(
                keys::ELAPSED_SECONDS,
                elapsed.map(|s| s.to_string()).unwrap_or_else(|| UNKNOWN.to_string()),
            );
        sections.push(timing);

        let mut params = ReportSection::new(PARAMETERS_SECTION);
        params.field(keys::STOP_METHOD, session.stop_method.to_string());
        if let Some(reason) = session.stop_reason {
            params.field(keys::STOPPED_BY, reason.to_string());
        }
        if let Some(secs) = session.stop_method.timer_duration_secs() {
            params.field(keys::TIMER_DURATION, format_timer_duration(secs));
        }
        params.field(
            keys::RECORDING_DELAY,
            format!("{} seconds", session.countdown_delay_secs),
        );
        sections.push(params);

        for channel in &session.channels {
            sections.push(camera_section(channel));
        }

        Self { sections }
    }

    pub fn section(&self, title: &str) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.title == title)
    }

    pub fn camera_section(&self, label: ChannelLabel) -> Option<&ReportSection> {
        let prefix = camera_section_prefix(label);
        self.sections.iter().find(|s| s.title.starts_with(&prefix))
    }

    /// Render as the plain-text session artifact
    pub fn render(&self) -> String {
        let mut out = String::new();
        push_line(&mut out, BANNER);
        push_line(&mut out, TITLE);
        push_line(&mut out, BANNER);
        out.push('\n');

        for section in &self.sections {
            push_line(&mut out, &section.title);
            push_line(&mut out, RULE);
            for (key, value) in &section.fields {
                push_line(&mut out, &format!("{key}: {value}"));
            }
            for group in &section.groups {
                out.push('\n');
                push_line(&mut out, &format!("{}:", group.title));
                for (key, value) in &group.entries {
                    push_line(&mut out, &format!("  {key}: {value}"));
                }
            }
            out.push('\n');
        }

        push_line(&mut out, BANNER);
        push_line(&mut out, FOOTER);
        push_line(&mut out, BANNER);
        out
    }

    /// Recover sections from a rendered report.
    ///
    /// A section starts at a line followed by a dashed rule and runs until
    /// the next section or a banner line.
    pub fn parse(text: &str) -> Result<Self, ReportError> {
        let lines: Vec<&str> = text.lines().collect();
        let mut sections = Vec::new();
        let mut current: Option<ReportSection> = None;
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let next_is_rule = lines.get(i + 1).map_or(false, |l| l.starts_with("---"));

            if next_is_rule && !line.trim().is_empty() {
                if let Some(done) = current.take() {
                    sections.push(done);
                }
                current = Some(ReportSection::new(line.trim()));
                i += 2;
                continue;
            }

            if line.starts_with("===") {
                if let Some(done) = current.take() {
                    sections.push(done);
                }
                i += 1;
                continue;
            }

            if let Some(section) = current.as_mut() {
                if line.trim().is_empty() {
                    // blank lines separate groups
                } else if let Some(entry) = line.strip_prefix("  ") {
                    let (key, value) = split_entry(entry).ok_or_else(|| {
                        ReportError::Parse(format!("line {}: expected 'key: value'", i + 1))
                    })?;
                    let group = section.groups.last_mut().ok_or_else(|| {
                        ReportError::Parse(format!(
                            "line {}: indented entry outside a group",
                            i + 1
                        ))
                    })?;
                    group.entries.push((key, value));
                } else if let Some(title) = group_title(line) {
                    section.groups.push(ReportGroup {
                        title: title.to_string(),
                        entries: Vec::new(),
                    });
                } else {
                    let (key, value) = split_entry(line).ok_or_else(|| {
                        ReportError::Parse(format!("line {}: expected 'Key: Value'", i + 1))
                    })?;
                    section.fields.push((key, value));
                }
            }
            i += 1;
        }

        if let Some(done) = current.take() {
            sections.push(done);
        }
        if sections.is_empty() {
            return Err(ReportError::Parse("no sections found".to_string()));
        }
        Ok(Self { sections })
    }

    /// Pull the key facts out of a report, failing if any is missing
    pub fn summary(&self) -> Result<ReportSummary, ReportError> {
        let info = self.require_section(SESSION_SECTION)?;
        let timing = self.require_section(TIMING_SECTION)?;
        let params = self.require_section(PARAMETERS_SECTION)?;

        let elapsed_text = require_field(timing, keys::ELAPSED_SECONDS)?;
        let elapsed_secs: u64 = elapsed_text.parse().map_err(|_| {
            ReportError::Parse(format!("invalid {}: '{}'", keys::ELAPSED_SECONDS, elapsed_text))
        })?;
        let total_duration = require_field(timing, keys::TOTAL_DURATION)?.to_string();
        if parse_hms(&total_duration).is_none() {
            return Err(ReportError::Parse(format!(
                "invalid {}: '{}'",
                keys::TOTAL_DURATION,
                total_duration
            )));
        }

        let mut camera_files: [String; 2] = Default::default();
        for label in ChannelLabel::ALL {
            let section = self.camera_section(label).ok_or_else(|| {
                ReportError::Parse(format!("missing section for camera {}", label.number()))
            })?;
            camera_files[label.index()] = require_field(section, keys::VIDEO_FILE)?.to_string();
        }

        Ok(ReportSummary {
            session_name: require_field(info, keys::SESSION_NAME)?.to_string(),
            save_path: require_field(info, keys::SAVE_PATH)?.to_string(),
            total_duration,
            elapsed_secs,
            stop_method: require_field(params, keys::STOP_METHOD)?.to_string(),
            camera_files,
        })
    }

    fn require_section(&self, title: &str) -> Result<&ReportSection, ReportError> {
        self.section(title)
            .ok_or_else(|| ReportError::Parse(format!("missing section {title}")))
    }
}

fn camera_section(channel: &CameraChannel) -> ReportSection {
    let mut section = ReportSection::new(camera_section_title(channel));
    section
        .field(keys::CHANNEL, channel.label.to_string())
        .field(keys::VIDEO_FILE, channel.file_name())
        .field(keys::START_TIME, format_timestamp(channel.started_at, TIME_FORMAT))
        .field(keys::END_TIME, format_timestamp(channel.ended_at, TIME_FORMAT));
    if channel.ended_best_effort {
        section.field(keys::END_TIME_STATUS, "best-effort");
    }
    for issue in &channel.issues {
        section.field(keys::ISSUE, issue.to_string());
    }
    section
        .group(keys::CONFIG_AT_START, &channel.config_at_start)
        .group(keys::CONFIG_AT_STOP, &channel.config_at_stop);
    section
}

fn require_field<'a>(section: &'a ReportSection, key: &str) -> Result<&'a str, ReportError> {
    section
        .get(key)
        .ok_or_else(|| ReportError::Parse(format!("missing '{}' in {}", key, section.title)))
}

/// `Title:` opens a group; `Key: value:` is still an entry
fn group_title(line: &str) -> Option<&str> {
    line.strip_suffix(':').filter(|title| !title.contains(": "))
}

fn split_entry(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    Some((key.trim().to_string(), value.trim().to_string()))
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}
