//! Log severity model and the extracted log record.

use serde::{Deserialize, Serialize};

/// Unified log severity, ordered least-to-most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    /// Map a syslog priority number (0 = emergency .. 7 = debug).
    pub fn from_syslog(priority: u8) -> Self {
        match priority {
            0 => LogLevel::Emergency,
            1 => LogLevel::Alert,
            2 => LogLevel::Critical,
            3 => LogLevel::Error,
            4 => LogLevel::Warning,
            5 => LogLevel::Notice,
            6 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    /// The syslog priority number for this level.
    pub fn syslog(&self) -> u8 {
        match self {
            LogLevel::Emergency => 0,
            LogLevel::Alert => 1,
            LogLevel::Critical => 2,
            LogLevel::Error => 3,
            LogLevel::Warning => 4,
            LogLevel::Notice => 5,
            LogLevel::Info => 6,
            LogLevel::Debug => 7,
        }
    }

    /// Parse a dmesg-style level word ("err", "warn", ...).
    pub fn from_dmesg(word: &str) -> Self {
        match word.trim() {
            "emerg" => LogLevel::Emergency,
            "alert" => LogLevel::Alert,
            "crit" => LogLevel::Critical,
            "err" => LogLevel::Error,
            "warn" => LogLevel::Warning,
            "notice" => LogLevel::Notice,
            "info" => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    /// The Windows Event Log level filter for "this level or more severe",
    /// as the comma-separated list wevtutil/Get-WinEvent queries expect.
    pub fn windows_filter(&self) -> &'static str {
        match self {
            LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical => "1",
            LogLevel::Error => "1,2",
            LogLevel::Warning => "1,2,3",
            LogLevel::Notice | LogLevel::Info | LogLevel::Debug => "1,2,3,4",
        }
    }

    /// Map a Windows Event Log level number to the unified severity.
    pub fn from_windows_level(level: u8) -> Self {
        match level {
            1 => LogLevel::Critical,
            2 => LogLevel::Error,
            3 => LogLevel::Warning,
            _ => LogLevel::Info,
        }
    }
}

/// One extracted log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Event time as Unix seconds.
    pub timestamp: i64,
    /// Source identifier ("kernel", "journal/sshd.service", "System", ...).
    pub source: String,
    /// Unified severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
    /// Emitting process ID, when the source reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    /// Emitting process name, when the source reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
}
