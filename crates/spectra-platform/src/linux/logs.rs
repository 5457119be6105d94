//! Log extraction for Linux: kernel ring buffer plus the systemd journal.
//!
//! Both backends are invoked as external tools with the severity filter
//! pushed down into the command line, so the agent never buffers more than
//! the capped result set.

use crate::{LogEntry, LogLevel, Result};
use chrono::{Local, NaiveDateTime, TimeZone};
use std::process::Command;

/// Hard ceiling on merged entries, to bound memory.
pub const MAX_ENTRIES: usize = 10_000;

/// Per-source line limit pushed into journalctl.
const JOURNAL_LINE_LIMIT: &str = "5000";

/// dmesg level words, indexed by syslog priority.
const DMESG_LEVELS: &[&str] = &["emerg", "alert", "crit", "err", "warn", "notice", "info", "debug"];

/// The `--level` list for "min_level or more severe".
fn dmesg_level_list(min_level: LogLevel) -> String {
    DMESG_LEVELS[..=min_level.syslog() as usize].join(",")
}

/// Fetch and merge logs from every available source, source-major, capped at
/// [`MAX_ENTRIES`]. A backend that cannot be invoked contributes nothing and
/// a log line; the other sources still merge.
pub fn fetch_logs(min_level: LogLevel) -> Result<Vec<LogEntry>> {
    let mut entries = Vec::new();

    match read_dmesg(min_level) {
        Ok(mut kernel) => entries.append(&mut kernel),
        Err(e) => log::warn!("dmesg extraction failed: {}", e),
    }

    match read_journal(min_level) {
        Ok(mut journal) => entries.append(&mut journal),
        Err(e) => log::warn!("journal extraction failed: {}", e),
    }

    entries.truncate(MAX_ENTRIES);
    Ok(entries)
}

// ============================================================================
// KERNEL RING BUFFER
// ============================================================================

/// Invoke dmesg with decoded facility/level prefixes and ctime dates.
fn read_dmesg(min_level: LogLevel) -> Result<Vec<LogEntry>> {
    let output = Command::new("dmesg")
        .arg("--decode")
        .arg("--ctime")
        .arg(format!("--level={}", dmesg_level_list(min_level)))
        .output()?;

    if !output.status.success() {
        return Err(crate::Error::Platform(format!(
            "dmesg exited with {}",
            output.status
        )));
    }

    Ok(parse_dmesg(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse decoded dmesg output.
///
/// Line shape: `facility :level  : [ctime date] message`. A line whose date
/// fails to parse inherits the previous line's timestamp; empty messages are
/// dropped.
pub fn parse_dmesg(content: &str) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let mut last_timestamp = 0i64;

    for line in content.lines() {
        let mut parts = line.splitn(3, ':');
        let (Some(facility), Some(level), Some(rest)) =
            (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };

        let facility = facility.trim();
        let level = LogLevel::from_dmesg(level);

        let rest = rest.trim_start();
        let (timestamp, message) = match split_bracketed_date(rest) {
            Some((date, message)) => {
                let timestamp = parse_ctime(date).unwrap_or(last_timestamp);
                (timestamp, message)
            }
            None => (last_timestamp, rest),
        };
        last_timestamp = timestamp;

        let message = message.trim();
        if message.is_empty() {
            continue;
        }

        let source = if facility == "kern" { "kernel" } else { facility };

        entries.push(LogEntry {
            timestamp,
            source: source.to_string(),
            level,
            message: message.to_string(),
            pid: None,
            process_name: None,
        });
    }

    entries
}

/// Split `[date] message` into its parts.
fn split_bracketed_date(rest: &str) -> Option<(&str, &str)> {
    let rest = rest.strip_prefix('[')?;
    let end = rest.find(']')?;
    Some((&rest[..end], &rest[end + 1..]))
}

/// Parse a ctime date ("Tue Aug  1 10:30:00 2025") as local time.
fn parse_ctime(date: &str) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(date.trim(), "%a %b %e %H:%M:%S %Y").ok()?;
    Local.from_local_datetime(&naive).single().map(|dt| dt.timestamp())
}

// ============================================================================
// SYSTEMD JOURNAL
// ============================================================================

/// Invoke journalctl in JSON mode with the priority filter pushed down.
fn read_journal(min_level: LogLevel) -> Result<Vec<LogEntry>> {
    let output = Command::new("journalctl")
        .arg("-p")
        .arg(min_level.syslog().to_string())
        .arg("-o")
        .arg("json")
        .arg("-n")
        .arg(JOURNAL_LINE_LIMIT)
        .arg("--no-pager")
        .output()?;

    if !output.status.success() {
        return Err(crate::Error::Platform(format!(
            "journalctl exited with {}",
            output.status
        )));
    }

    Ok(parse_journal(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse journalctl JSON output, one record per line. Records that fail to
/// decode are skipped.
pub fn parse_journal(content: &str) -> Vec<LogEntry> {
    content.lines().filter_map(parse_journal_record).collect()
}

fn parse_journal_record(line: &str) -> Option<LogEntry> {
    let record: serde_json::Value = serde_json::from_str(line).ok()?;

    let message = record.get("MESSAGE")?.as_str()?.to_string();

    // Microseconds since epoch, as a decimal string
    let timestamp = record
        .get("__REALTIME_TIMESTAMP")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<i64>().ok())
        .map(|us| us / 1_000_000)
        .unwrap_or(0);

    let level = record
        .get("PRIORITY")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<u8>().ok())
        .map(LogLevel::from_syslog)
        .unwrap_or(LogLevel::Info);

    let ident = ["_SYSTEMD_UNIT", "SYSLOG_IDENTIFIER", "_COMM"]
        .iter()
        .find_map(|key| record.get(*key).and_then(|v| v.as_str()).filter(|s| !s.is_empty()))
        .unwrap_or("unknown");

    let pid = record
        .get("_PID")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<i32>().ok());

    let process_name = record
        .get("_COMM")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    Some(LogEntry {
        timestamp,
        source: format!("journal/{}", ident),
        level,
        message,
        pid,
        process_name,
    })
}
