//! Command channel wire types: operator-issued commands, their request
//! payloads, and the result records the agent uploads back.

use crate::LogLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The closed set of command kinds the agent understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    FetchLogs,
    DiskUsage,
    RestartAgent,
    ListMounts,
    NetworkDiag,
}

/// An operator-issued unit of work pulled from the server.
///
/// `id` is opaque to the agent and echoed on the result. `payload` stays raw
/// until the dispatcher decodes it for the concrete handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CommandType,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// The agent's answer to one command.
///
/// Exactly one of `payload` or `error` is populated; both may be absent when
/// the command had no result body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CommandType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    /// Build a success result carrying a serialized payload.
    pub fn ok(command: &Command, payload: serde_json::Value) -> Self {
        Self { id: command.id.clone(), kind: command.kind, payload: Some(payload), error: None }
    }

    /// Build a failure result carrying the error text.
    pub fn failed(command: &Command, error: impl ToString) -> Self {
        Self {
            id: command.id.clone(),
            kind: command.kind,
            payload: None,
            error: Some(error.to_string()),
        }
    }
}

/// Payload of a FETCH_LOGS command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogRequest {
    /// Only entries at this severity or above are returned.
    #[serde(default)]
    pub min_level: LogLevel,
}

/// Payload of a DISK_USAGE command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskUsageRequest {
    /// Scan root; empty means the platform default path.
    #[serde(default)]
    pub path: String,
    /// Entries to keep per heap; zero means the default of 50.
    #[serde(default)]
    pub top_n: usize,
}

/// Payload of a NETWORK_DIAG command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkDiagRequest {
    /// One of "ping", "traceroute", "netstat", "connect".
    pub action: String,
    /// Probe target: host, host:port for connect, unused for netstat.
    #[serde(default)]
    pub target: String,
    /// Reserved probe count; the prober currently always sends 4.
    #[serde(default)]
    pub count: u32,
}

// ============================================================================
// DISK USAGE REPORT
// ============================================================================

/// One retained entry of a top-N selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopEntry {
    /// Absolute path of the file or directory.
    pub path: String,
    /// Size in bytes; for directories, the sum of contained file sizes.
    pub size: u64,
    /// File count (directories only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl TopEntry {
    /// A file entry.
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self { path: path.into(), size, count: None }
    }

    /// A directory entry with its recursive file count.
    pub fn dir(path: impl Into<String>, size: u64, count: u64) -> Self {
        Self { path: path.into(), size, count: Some(count) }
    }
}

/// Result of a DISK_USAGE scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskUsageTopReport {
    /// Scan root.
    pub root: String,
    /// Largest directories, size descending.
    pub top_dirs: Vec<TopEntry>,
    /// Largest files, size descending.
    pub top_files: Vec<TopEntry>,
    /// Directories visited.
    pub scanned_dirs: u64,
    /// Regular files visited.
    pub scanned_files: u64,
    /// Unreadable directories skipped.
    pub error_count: u64,
    /// Reserved for a future scan quota; currently always false.
    pub partial: bool,
    /// Wall-clock scan duration in milliseconds.
    pub duration_ms: u64,
    /// Scan completion time as Unix seconds.
    pub scanned_at: i64,
}

// ============================================================================
// NETWORK DIAGNOSTICS
// ============================================================================

/// Serialize a `Duration` as integer nanoseconds on the wire.
pub mod duration_ns {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_nanos().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(d)?;
        Ok(Duration::from_nanos(nanos))
    }
}

/// Outcome of a single probe exchange (ICMP echo or TCP connect).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResult {
    /// Probe sequence number.
    pub seq: u16,
    /// Whether a matching reply arrived.
    pub success: bool,
    /// Round-trip time; zero when no reply arrived.
    #[serde(with = "duration_ns")]
    pub rtt: Duration,
    /// "reply", "timeout", "dest unreachable", "ttl exceeded", "write failed: ...".
    pub response: String,
    /// Address the reply (or error) came from; empty when none arrived.
    pub peer: String,
    /// ICMP code for unreachable/exceeded responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u8>,
}

impl PingResult {
    /// A probe that saw no answer inside its window.
    pub fn timeout(seq: u16) -> Self {
        Self {
            seq,
            success: false,
            rtt: Duration::ZERO,
            response: "timeout".to_string(),
            peer: String::new(),
            code: None,
        }
    }
}

/// One row of the socket table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetstatEntry {
    /// "tcp", "tcp6", "udp" or "udp6".
    pub proto: String,
    pub local_addr: String,
    pub local_port: u16,
    pub remote_addr: String,
    pub remote_port: u16,
    /// TCP state name; empty for UDP.
    #[serde(default)]
    pub state: String,
    /// Owning UID as a string (Unix only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Owning process ID (Windows only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Result body of a NETWORK_DIAG command; the populated field depends on the
/// requested action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkDiagResult {
    pub action: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_results: Option<Vec<PingResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netstat: Option<Vec<NetstatEntry>>,
}

// ============================================================================
// MOUNTS AND REGISTRATION
// ============================================================================

/// One mounted filesystem as tracked by the drive cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    /// Device path or identifier.
    pub device: String,
    /// Mount point (drive letter list on Windows).
    pub mountpoint: String,
    /// Filesystem type.
    pub fstype: String,
}

/// Host identity posted once at registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    /// Operating system name (e.g., "Linux").
    pub os: String,
    /// Kernel release string.
    pub kernel_version: String,
    pub cpu_count: u32,
    pub total_memory_bytes: u64,
    pub agent_version: String,
    /// Registration time as Unix seconds.
    pub registered_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_type_screaming_names() {
        let json = serde_json::to_string(&CommandType::FetchLogs).unwrap();
        assert_eq!(json, r#""FETCH_LOGS""#);
        let back: CommandType = serde_json::from_str(r#""NETWORK_DIAG""#).unwrap();
        assert_eq!(back, CommandType::NetworkDiag);
    }

    #[test]
    fn command_decodes_with_missing_payload() {
        let cmd: Command = serde_json::from_str(r#"{"id":"c1","type":"LIST_MOUNTS"}"#).unwrap();
        assert_eq!(cmd.id, "c1");
        assert_eq!(cmd.kind, CommandType::ListMounts);
        assert!(cmd.payload.is_null());
    }

    #[test]
    fn result_populates_payload_xor_error() {
        let cmd: Command = serde_json::from_str(r#"{"id":"c2","type":"DISK_USAGE"}"#).unwrap();

        let ok = CommandResult::ok(&cmd, serde_json::json!({"x": 1}));
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("payload").is_some());
        assert!(json.get("error").is_none());

        let failed = CommandResult::failed(&cmd, "boom");
        let json = serde_json::to_value(&failed).unwrap();
        assert!(json.get("payload").is_none());
        assert_eq!(json["error"], "boom");
        assert_eq!(json["id"], "c2");
    }

    #[test]
    fn ping_result_rtt_serializes_as_nanos() {
        let mut probe = PingResult::timeout(2);
        probe.rtt = Duration::from_millis(3);
        let json = serde_json::to_value(&probe).unwrap();
        assert_eq!(json["rtt"], 3_000_000u64);
        assert_eq!(json["seq"], 2);
        assert!(json.get("code").is_none());
        let back: PingResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.rtt, Duration::from_millis(3));
    }

    #[test]
    fn log_request_defaults_to_info() {
        let req: LogRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.min_level, LogLevel::Info);
    }
}
