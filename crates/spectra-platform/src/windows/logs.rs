//! Event Log extraction for Windows.
//!
//! Events come from the System and Application channels via PowerShell's
//! `Get-WinEvent`, filtered to the mapped severity and bounded by the last
//! boot time. Messages are cleaned of trailing context blocks and collapsed
//! to single-space runs.

use crate::{LogEntry, LogLevel, Result};
use std::process::Command;

/// Hard ceiling on merged entries, to bound memory.
pub const MAX_ENTRIES: usize = 25_000;

/// Fetch and merge events from both channels, capped at [`MAX_ENTRIES`].
pub fn fetch_logs(min_level: LogLevel) -> Result<Vec<LogEntry>> {
    let mut entries = Vec::new();

    for channel in ["System", "Application"] {
        match read_channel(channel, min_level) {
            Ok(mut events) => entries.append(&mut events),
            Err(e) => log::warn!("{} event extraction failed: {}", channel, e),
        }
    }

    entries.truncate(MAX_ENTRIES);
    Ok(entries)
}

fn read_channel(channel: &str, min_level: LogLevel) -> Result<Vec<LogEntry>> {
    let script = format!(
        "$boot = (Get-CimInstance Win32_OperatingSystem).LastBootUpTime; \
         Get-WinEvent -FilterHashtable @{{LogName='{}'; Level={}; StartTime=$boot}} \
         -MaxEvents {} -ErrorAction SilentlyContinue | \
         Select-Object TimeCreated,Level,ProviderName,Message,ProcessId | ConvertTo-Json",
        channel,
        min_level.windows_filter(),
        MAX_ENTRIES
    );

    let output = Command::new("powershell").args(["-NoProfile", "-Command", &script]).output()?;

    if !output.status.success() {
        return Err(crate::Error::Platform(format!("powershell exited with {}", output.status)));
    }

    Ok(parse_events(&String::from_utf8_lossy(&output.stdout), channel))
}

/// Parse the ConvertTo-Json output of a channel query. A single event comes
/// back as an object rather than an array.
pub fn parse_events(content: &str, channel: &str) -> Vec<LogEntry> {
    let value: serde_json::Value = match serde_json::from_str(content.trim()) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let events: Vec<serde_json::Value> = match value {
        serde_json::Value::Array(items) => items,
        object @ serde_json::Value::Object(_) => vec![object],
        _ => return Vec::new(),
    };

    events
        .into_iter()
        .filter_map(|event| {
            let message = clean_message(event.get("Message")?.as_str()?);
            if message.is_empty() {
                return None;
            }

            let timestamp = event
                .get("TimeCreated")
                .and_then(|v| v.as_str())
                .and_then(parse_win_date)
                .unwrap_or(0);

            let level = event
                .get("Level")
                .and_then(|v| v.as_u64())
                .map(|l| LogLevel::from_windows_level(l as u8))
                .unwrap_or(LogLevel::Info);

            let process_name =
                event.get("ProviderName").and_then(|v| v.as_str()).map(|s| s.to_string());

            let pid = event.get("ProcessId").and_then(|v| v.as_i64()).map(|p| p as i32);

            Some(LogEntry {
                timestamp,
                source: channel.to_string(),
                level,
                message,
                pid,
                process_name,
            })
        })
        .collect()
}

/// Parse the `/Date(1700000000000)/` timestamp form into Unix seconds.
pub fn parse_win_date(value: &str) -> Option<i64> {
    let ms: i64 = value.strip_prefix("/Date(")?.strip_suffix(")/")?.parse().ok()?;
    Some(ms / 1000)
}

/// Drop everything after "Context:" or "Operation:", then collapse every
/// whitespace run to a single space.
pub fn clean_message(message: &str) -> String {
    let cut = ["Context:", "Operation:"]
        .iter()
        .filter_map(|marker| message.find(marker))
        .min()
        .unwrap_or(message.len());

    message[..cut].split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win_date_maps_to_seconds() {
        assert_eq!(parse_win_date("/Date(1700000000123)/"), Some(1_700_000_000));
        assert_eq!(parse_win_date("2023-11-14"), None);
    }

    #[test]
    fn message_cleaning_drops_context_and_collapses() {
        let raw = "Service  entered\r\n   the running state.\r\nContext:\r\n  Noise here";
        assert_eq!(clean_message(raw), "Service entered the running state.");

        let raw = "Write failure\nOperation:\n  details";
        assert_eq!(clean_message(raw), "Write failure");
    }

    #[test]
    fn parses_single_object_and_array() {
        let single = r#"{"TimeCreated":"/Date(1700000000000)/","Level":2,"ProviderName":"disk","Message":"Bad  block","ProcessId":4}"#;
        let events = parse_events(single, "System");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, LogLevel::Error);
        assert_eq!(events[0].message, "Bad block");
        assert_eq!(events[0].source, "System");

        let array = format!("[{},{}]", single, single);
        assert_eq!(parse_events(&array, "System").len(), 2);
    }
}
