//! spectra-platform - Platform-specific samplers and probes
//!
//! This crate provides the sampler set, mount enumeration, socket tables,
//! and log extraction for each supported platform:
//! - Linux: via the /proc and /sys filesystems plus a few external tools
//! - Windows: via PowerShell, netstat, and the Event Log subsystem
//!
//! Unsupported platforms get a deterministic stub whose samplers return
//! empty lists, so the scheduler can treat every platform uniformly.

pub use spectra_metrics::{
    Error, LogEntry, LogLevel, Metric, MountInfo, NetstatEntry, Result, Sampler, SamplerSpec,
};

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(windows)]
pub mod windows;

#[cfg(not(any(target_os = "linux", windows)))]
pub mod stub;

#[cfg(target_os = "linux")]
use linux as platform;

#[cfg(windows)]
use windows as platform;

#[cfg(not(any(target_os = "linux", windows)))]
use stub as platform;

use spectra_cache::DriveCache;
use std::sync::Arc;

/// The periodic sampler set for this platform, each paired with its cadence.
///
/// Samplers that need the drive cache close over the shared reference; the
/// scheduler only ever sees the uniform [`Sampler`] contract.
pub fn periodic_samplers(drives: Arc<DriveCache>) -> Vec<SamplerSpec> {
    platform::periodic_samplers(drives)
}

/// The nightly inventory sampler set, paired with the local wall-clock
/// (hour, minute) each should run at.
pub fn nightly_samplers() -> Vec<(u32, u32, Box<dyn Sampler>)> {
    platform::nightly_samplers()
}

/// Enumerate mounted filesystems for the drive cache, already filtered and
/// keyed the way the cache expects.
pub fn list_mounts() -> Result<Vec<MountInfo>> {
    platform::list_mounts()
}

/// Read the full socket table.
pub fn netstat_entries() -> Result<Vec<NetstatEntry>> {
    platform::netstat_entries()
}

/// Extract recent logs at `min_level` or above from every available source.
pub fn fetch_logs(min_level: LogLevel) -> Result<Vec<LogEntry>> {
    platform::fetch_logs(min_level)
}

/// Describe this host for registration.
pub fn host_info(hostname: &str, agent_version: &str) -> spectra_metrics::HostInfo {
    platform::host_info(hostname, agent_version)
}
