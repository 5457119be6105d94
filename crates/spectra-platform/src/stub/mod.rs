//! Stub implementation for unsupported platforms.
//!
//! Every operation is deterministic: samplers and enumerations return empty
//! lists, probes report NotSupported. The scheduler and command loop treat
//! this platform like any other.

use crate::{Error, LogEntry, LogLevel, MountInfo, NetstatEntry, Result, Sampler, SamplerSpec};
use spectra_cache::DriveCache;
use spectra_metrics::HostInfo;
use std::sync::Arc;

pub fn periodic_samplers(_drives: Arc<DriveCache>) -> Vec<SamplerSpec> {
    Vec::new()
}

pub fn nightly_samplers() -> Vec<(u32, u32, Box<dyn Sampler>)> {
    Vec::new()
}

pub fn list_mounts() -> Result<Vec<MountInfo>> {
    Ok(Vec::new())
}

pub fn netstat_entries() -> Result<Vec<NetstatEntry>> {
    Err(Error::NotSupported)
}

pub fn fetch_logs(_min_level: LogLevel) -> Result<Vec<LogEntry>> {
    Err(Error::NotSupported)
}

pub fn host_info(hostname: &str, agent_version: &str) -> HostInfo {
    HostInfo {
        hostname: hostname.to_string(),
        os: std::env::consts::OS.to_string(),
        kernel_version: String::new(),
        cpu_count: std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(0),
        total_memory_bytes: 0,
        agent_version: agent_version.to_string(),
        registered_at: chrono::Utc::now().timestamp(),
    }
}
