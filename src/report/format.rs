//! Value formatting for session reports

use chrono::{DateTime, Local};
use serde_json::Value;

/// Timestamp layout for the timing section
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp layout for per-camera start/end lines
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Placeholder for facts that were never recorded
pub const UNKNOWN: &str = "N/A";

/// Format whole seconds as `HH:MM:SS`. Hours are not wrapped.
pub fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Inverse of [`format_hms`]
pub fn parse_hms(text: &str) -> Option<u64> {
    let mut parts = text.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

pub fn format_timestamp(ts: Option<DateTime<Local>>, layout: &str) -> String {
    ts.map(|t| t.format(layout).to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// `10 minutes (600 seconds)`, or `1.5 minutes (90 seconds)`
pub fn format_timer_duration(secs: u32) -> String {
    if secs % 60 == 0 {
        format!("{} minutes ({} seconds)", secs / 60, secs)
    } else {
        format!("{:.1} minutes ({} seconds)", f64::from(secs) / 60.0, secs)
    }
}

/// Render a camera setting value on one line.
///
/// Two-element arrays are shown as `W x H`, strings without quotes.
pub fn format_config_value(value: &Value) -> String {
    match value {
        Value::Null => UNKNOWN.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) if items.len() == 2 => format!(
            "{} x {}",
            format_config_value(&items[0]),
            format_config_value(&items[1])
        ),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(format_config_value).collect();
            format!("[{}]", inner.join(", "))
        }
        other => other.to_string(),
    }
}
