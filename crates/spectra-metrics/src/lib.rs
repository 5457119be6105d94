//! spectra-metrics - Wire model shared by the agent and the server
//!
//! This crate defines the metric envelope and the command channel types,
//! plus the sampler contract that platform-specific code implements.

mod command;
mod logs;
mod metric;

pub use command::{
    Command, CommandResult, CommandType, DiskUsageRequest, DiskUsageTopReport, HostInfo,
    LogRequest, MountInfo, NetstatEntry, NetworkDiagRequest, NetworkDiagResult, PingResult,
    TopEntry,
};
pub use logs::{LogEntry, LogLevel};
pub use metric::{
    ApplicationInfo, ApplicationListMetric, ClockMetric, ContainerListMetric, ContainerMetric,
    CpuMetric, DiskIoMetric, DiskMetric, GpuMetric, MemoryMetric, Metric, NetworkMetric,
    ProcessListMetric, ProcessMetric, ServiceListMetric, ServiceMetric, SystemMetric,
    TemperatureMetric, ThrottleMetric, VoltageMetric, WifiMetric,
};

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error types for sampling and diagnostics.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation not supported on this platform.
    #[error("operation not supported on this platform")]
    NotSupported,

    /// Operation not implemented by this agent.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Resource not found.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed payload or record.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Platform-specific error.
    #[error("platform error: {0}")]
    Platform(String),

    /// The operation was cancelled by shutdown or a deadline.
    #[error("operation cancelled")]
    Cancelled,
}

/// Result type alias for sampling operations.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// SAMPLER CONTRACT
// ============================================================================

/// A producer of metrics for one class (CPU, disk, ...).
///
/// Samplers own whatever state they need between invocations (previous raw
/// counters for delta metrics). The first call of a delta-based sampler may
/// return an empty list to establish its baseline; that is not an error.
pub trait Sampler: Send {
    /// Short sampler name used in log lines.
    fn name(&self) -> &'static str;

    /// Produce zero or more metrics.
    fn sample(&mut self) -> Result<Vec<Metric>>;
}

/// A sampler paired with its collection cadence.
pub struct SamplerSpec {
    /// Tick interval for the scheduler.
    pub interval: Duration,
    /// The sampler itself.
    pub sampler: Box<dyn Sampler>,
}

impl SamplerSpec {
    /// Pair a sampler with an interval.
    pub fn new(interval: Duration, sampler: Box<dyn Sampler>) -> Self {
        Self { interval, sampler }
    }
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// Wire record wrapping a single metric with identification metadata.
///
/// Serializes as `{"type": ..., "timestamp": ..., "hostname": ..., "data": ...}`
/// where `type` is always the variant tag of `data`. The tag is derived at
/// serialization time, so the two can never disagree.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Wall-clock collection time.
    pub timestamp: DateTime<Utc>,
    /// Identity of the reporting host.
    pub hostname: String,
    /// The metric payload.
    pub data: Metric,
}

impl Envelope {
    /// Wrap a metric, stamping it with the hostname and the current time.
    pub fn new(hostname: impl Into<String>, data: Metric) -> Self {
        Self { timestamp: Utc::now(), hostname: hostname.into(), data }
    }

    /// The variant tag of the wrapped metric.
    pub fn kind(&self) -> &'static str {
        self.data.tag()
    }
}

impl Serialize for Envelope {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("Envelope", 4)?;
        state.serialize_field("type", self.data.tag())?;
        state.serialize_field("timestamp", &self.timestamp.to_rfc3339())?;
        state.serialize_field("hostname", &self.hostname)?;
        state.serialize_field("data", &self.data)?;
        state.end()
    }
}

/// Raw envelope form used on the receive path: `data` stays opaque until the
/// tag is inspected.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    timestamp: DateTime<Utc>,
    hostname: String,
    data: serde_json::Value,
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawEnvelope::deserialize(deserializer)?;
        let data = Metric::from_tagged(&raw.kind, raw.data).map_err(serde::de::Error::custom)?;
        Ok(Envelope { timestamp: raw.timestamp, hostname: raw.hostname, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cpu() -> Metric {
        Metric::Cpu(CpuMetric {
            user_percent: 12.5,
            system_percent: 3.5,
            idle_percent: 80.0,
            iowait_percent: 2.0,
            steal_percent: 0.0,
            cores: 8,
            frequency_mhz: 3600,
            load_1min: 0.5,
            load_5min: 0.4,
            load_15min: 0.3,
        })
    }

    #[test]
    fn envelope_type_matches_data_tag() {
        let env = Envelope::new("host-a", sample_cpu());
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "cpu");
        assert_eq!(json["hostname"], "host-a");
        assert!(json["data"].is_object());
        assert_eq!(json["data"]["cores"], 8);
    }

    #[test]
    fn envelope_timestamp_is_rfc3339() {
        let env = Envelope::new("host-a", sample_cpu());
        let json = serde_json::to_value(&env).unwrap();
        let ts = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn envelope_round_trip() {
        let env = Envelope::new("host-a", sample_cpu());
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.hostname, "host-a");
        assert_eq!(back.kind(), "cpu");
        match back.data {
            Metric::Cpu(cpu) => assert_eq!(cpu.cores, 8),
            other => panic!("unexpected variant {}", other.tag()),
        }
    }

    #[test]
    fn envelope_rejects_unknown_tag() {
        let json = r#"{"type":"quantum","timestamp":"2025-01-01T00:00:00Z","hostname":"h","data":{}}"#;
        assert!(serde_json::from_str::<Envelope>(json).is_err());
    }

    #[test]
    fn every_variant_tag_round_trips_through_envelope() {
        for metric in metric::all_variants_for_test() {
            let tag = metric.tag();
            let env = Envelope::new("h", metric);
            let json = serde_json::to_string(&env).unwrap();
            let back: Envelope = serde_json::from_str(&json).unwrap();
            assert_eq!(back.kind(), tag);
        }
    }
}
