//! Windows platform implementation
//!
//! The command surface (event logs, socket table, physical drives) is fully
//! implemented via the Event Log subsystem, `netstat -ano`, and CIM queries.
//! OS sensor sampling is contract-level only: the periodic set is empty and
//! the scheduler treats that like any other platform whose samplers return
//! nothing.

mod drives;
mod logs;
mod sockets;

pub use logs::fetch_logs;
pub use sockets::netstat_entries;

use crate::{MountInfo, Result, Sampler, SamplerSpec};
use spectra_cache::DriveCache;
use spectra_metrics::HostInfo;
use std::sync::Arc;

/// No periodic OS samplers are wired on Windows yet.
pub fn periodic_samplers(_drives: Arc<DriveCache>) -> Vec<SamplerSpec> {
    Vec::new()
}

/// No nightly inventory samplers are wired on Windows yet.
pub fn nightly_samplers() -> Vec<(u32, u32, Box<dyn Sampler>)> {
    Vec::new()
}

/// Enumerate physical drives for the drive cache.
pub fn list_mounts() -> Result<Vec<MountInfo>> {
    drives::list_physical_drives()
}

/// Describe this host for registration.
pub fn host_info(hostname: &str, agent_version: &str) -> HostInfo {
    HostInfo {
        hostname: hostname.to_string(),
        os: "Windows".to_string(),
        kernel_version: drives::os_version().unwrap_or_default(),
        cpu_count: std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(0),
        total_memory_bytes: 0,
        agent_version: agent_version.to_string(),
        registered_at: chrono::Utc::now().timestamp(),
    }
}
