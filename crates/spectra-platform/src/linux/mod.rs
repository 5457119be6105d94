//! Linux platform implementation
//!
//! Samplers collect via the /proc and /sys filesystems plus a few external
//! tools. Delta-based samplers keep their previous raw counters privately
//! and return an empty baseline list on their first call.

mod inventory;
mod logs;
mod procfs;
mod rpi;
mod sockets;
mod thermal;
mod wireless;

pub use logs::fetch_logs;
pub use sockets::{netstat_entries, parse_addr_port, parse_socket_table, tcp_state_name};

use crate::{MountInfo, Result, Sampler, SamplerSpec};
use spectra_cache::DriveCache;
use spectra_metrics::{
    CpuMetric, DiskIoMetric, DiskMetric, HostInfo, MemoryMetric, Metric, ProcessListMetric,
    ProcessMetric, SystemMetric,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Heaviest processes kept in one process_list snapshot.
const PROCESS_LIST_LIMIT: usize = 20;

/// Enumerate mounted filesystems for the drive cache.
pub fn list_mounts() -> Result<Vec<MountInfo>> {
    procfs::read_mounts()
}

/// The periodic sampler set with its cadence table.
pub fn periodic_samplers(drives: Arc<DriveCache>) -> Vec<SamplerSpec> {
    use std::time::Duration;

    let mut specs = vec![
        SamplerSpec::new(Duration::from_secs(5), Box::new(CpuSampler::default()) as Box<dyn Sampler>),
        SamplerSpec::new(Duration::from_secs(10), Box::new(MemorySampler)),
        SamplerSpec::new(Duration::from_secs(10), Box::new(NetworkSampler::default())),
        SamplerSpec::new(Duration::from_secs(15), Box::new(DiskIoSampler::new(drives.clone()))),
        SamplerSpec::new(Duration::from_secs(30), Box::new(TemperatureSampler)),
        SamplerSpec::new(Duration::from_secs(30), Box::new(WifiSampler)),
        SamplerSpec::new(Duration::from_secs(60), Box::new(DiskSampler::new(drives))),
        SamplerSpec::new(Duration::from_secs(60), Box::new(SystemSampler)),
        SamplerSpec::new(Duration::from_secs(300), Box::new(ProcessSampler)),
    ];

    // Firmware metrics only exist on a Pi; the sampler stays registered and
    // returns empty lists elsewhere so the scheduler needs no special case.
    specs.push(SamplerSpec::new(Duration::from_secs(60), Box::new(FirmwareSampler::new())));

    specs
}

/// Nightly inventory samplers with their local run times (hour, minute).
pub fn nightly_samplers() -> Vec<(u32, u32, Box<dyn Sampler>)> {
    vec![
        (2, 0, Box::new(ApplicationListSampler) as Box<dyn Sampler>),
        (2, 5, Box::new(ServiceListSampler)),
    ]
}

/// Describe this host for registration.
pub fn host_info(hostname: &str, agent_version: &str) -> HostInfo {
    let (os, kernel_version) = procfs::read_os_release();
    let cpu_count = procfs::CpuInfo::read().map(|c| c.num_cores).unwrap_or(0);
    let total_memory_bytes = procfs::MemInfo::read().map(|m| m.mem_total).unwrap_or(0);

    HostInfo {
        hostname: hostname.to_string(),
        os,
        kernel_version,
        cpu_count,
        total_memory_bytes,
        agent_version: agent_version.to_string(),
        registered_at: chrono::Utc::now().timestamp(),
    }
}

// ============================================================================
// CPU
// ============================================================================

/// CPU sampler: percentages from /proc/stat counter deltas.
#[derive(Default)]
struct CpuSampler {
    prev: Option<procfs::CpuTimes>,
}

impl Sampler for CpuSampler {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        let times = procfs::CpuTimes::read()?;
        let Some(prev) = self.prev.replace(times) else {
            // First call establishes the baseline
            return Ok(Vec::new());
        };

        let delta = times.delta(&prev);
        let total = delta.total();
        if total == 0 {
            return Ok(Vec::new());
        }

        let pct = |ticks: u64| ticks as f64 / total as f64 * 100.0;

        let info = procfs::CpuInfo::read().unwrap_or_default();
        let load = procfs::LoadAvg::read().unwrap_or_default();

        Ok(vec![Metric::Cpu(CpuMetric {
            user_percent: pct(delta.user + delta.nice),
            system_percent: pct(delta.system + delta.irq + delta.softirq),
            idle_percent: pct(delta.idle),
            iowait_percent: pct(delta.iowait),
            steal_percent: pct(delta.steal),
            cores: info.num_cores,
            frequency_mhz: info.frequency_mhz,
            load_1min: load.load_1min,
            load_5min: load.load_5min,
            load_15min: load.load_15min,
        })])
    }
}

// ============================================================================
// MEMORY
// ============================================================================

struct MemorySampler;

impl Sampler for MemorySampler {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        let info = procfs::MemInfo::read()?;
        let used = info.mem_total.saturating_sub(info.mem_available);
        let used_percent =
            if info.mem_total > 0 { used as f64 / info.mem_total as f64 * 100.0 } else { 0.0 };

        Ok(vec![Metric::Memory(MemoryMetric {
            total_bytes: info.mem_total,
            available_bytes: info.mem_available,
            used_bytes: used,
            used_percent,
            cached_bytes: info.cached,
            buffers_bytes: info.buffers,
            swap_total_bytes: info.swap_total,
            swap_used_bytes: info.swap_total.saturating_sub(info.swap_free),
        })])
    }
}

// ============================================================================
// DISK USAGE
// ============================================================================

/// Disk usage per cached mount via statvfs.
struct DiskSampler {
    drives: Arc<DriveCache>,
}

impl DiskSampler {
    fn new(drives: Arc<DriveCache>) -> Self {
        Self { drives }
    }
}

impl Sampler for DiskSampler {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        let mut metrics = Vec::new();

        for mount in self.drives.snapshot() {
            let usage = match procfs::read_fs_usage(&mount.mountpoint) {
                Ok(u) => u,
                Err(e) => {
                    log::debug!("statvfs {} failed: {}", mount.mountpoint, e);
                    continue;
                }
            };

            metrics.push(Metric::Disk(DiskMetric {
                device: mount.device,
                mountpoint: mount.mountpoint,
                fstype: mount.fstype,
                total_bytes: usage.total_bytes,
                used_bytes: usage.used_bytes,
                free_bytes: usage.free_bytes,
                used_percent: usage.used_percent,
                inodes_total: usage.inodes_total,
                inodes_used: usage.inodes_used,
                inodes_free: usage.inodes_free,
            }));
        }

        Ok(metrics)
    }
}

// ============================================================================
// DISK I/O
// ============================================================================

/// Per-device I/O rates from /proc/diskstats deltas, restricted to devices
/// the drive cache knows.
struct DiskIoSampler {
    drives: Arc<DriveCache>,
    prev: Option<(Instant, HashMap<String, procfs::DiskCounters>)>,
}

impl DiskIoSampler {
    fn new(drives: Arc<DriveCache>) -> Self {
        Self { drives, prev: None }
    }
}

impl Sampler for DiskIoSampler {
    fn name(&self) -> &'static str {
        "disk_io"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        let now = Instant::now();
        let counters: HashMap<String, procfs::DiskCounters> = procfs::read_diskstats()?
            .into_iter()
            .map(|c| (c.device.clone(), c))
            .collect();

        let Some((prev_at, prev)) = self.prev.replace((now, counters.clone())) else {
            return Ok(Vec::new());
        };

        let elapsed = now.duration_since(prev_at).as_secs_f64();
        if elapsed <= 0.0 {
            return Ok(Vec::new());
        }

        let mut metrics = Vec::new();
        for device in self.drives.devices() {
            // Partition devices map onto their whole-disk counters when the
            // partition itself has no row.
            let Some(current) = counters.get(&device).or_else(|| {
                let parent = device.trim_end_matches(|c: char| c.is_ascii_digit());
                counters.get(parent)
            }) else {
                continue;
            };
            let Some(before) = prev.get(&current.device) else { continue };

            let reads = current.reads_completed.saturating_sub(before.reads_completed);
            let writes = current.writes_completed.saturating_sub(before.writes_completed);
            let sectors_read = current.sectors_read.saturating_sub(before.sectors_read);
            let sectors_written = current.sectors_written.saturating_sub(before.sectors_written);
            let busy_ms = current.io_time_ms.saturating_sub(before.io_time_ms);

            metrics.push(Metric::DiskIo(DiskIoMetric {
                device: current.device.clone(),
                reads_per_sec: reads as f64 / elapsed,
                writes_per_sec: writes as f64 / elapsed,
                // 512 bytes per sector
                read_bytes_per_sec: (sectors_read as f64 * 512.0 / elapsed) as u64,
                write_bytes_per_sec: (sectors_written as f64 * 512.0 / elapsed) as u64,
                busy_percent: (busy_ms as f64 / (elapsed * 1000.0) * 100.0).min(100.0),
            }));
        }

        Ok(metrics)
    }
}

// ============================================================================
// NETWORK
// ============================================================================

/// Per-interface rates from /proc/net/dev deltas. Loopback is skipped.
#[derive(Default)]
struct NetworkSampler {
    prev: Option<(Instant, HashMap<String, procfs::NetCounters>)>,
}

impl Sampler for NetworkSampler {
    fn name(&self) -> &'static str {
        "network"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        let now = Instant::now();
        let counters: HashMap<String, procfs::NetCounters> = procfs::read_net_dev()?
            .into_iter()
            .filter(|c| c.interface != "lo")
            .map(|c| (c.interface.clone(), c))
            .collect();

        let Some((prev_at, prev)) = self.prev.replace((now, counters.clone())) else {
            return Ok(Vec::new());
        };

        let elapsed = now.duration_since(prev_at).as_secs_f64();
        if elapsed <= 0.0 {
            return Ok(Vec::new());
        }

        let mut metrics = Vec::new();
        for (name, current) in &counters {
            let Some(before) = prev.get(name) else { continue };

            metrics.push(Metric::Network(spectra_metrics::NetworkMetric {
                interface: name.clone(),
                rx_bytes_per_sec: (current.rx_bytes.saturating_sub(before.rx_bytes) as f64
                    / elapsed) as u64,
                tx_bytes_per_sec: (current.tx_bytes.saturating_sub(before.tx_bytes) as f64
                    / elapsed) as u64,
                rx_packets_per_sec: current.rx_packets.saturating_sub(before.rx_packets) as f64
                    / elapsed,
                tx_packets_per_sec: current.tx_packets.saturating_sub(before.tx_packets) as f64
                    / elapsed,
                rx_errors: current.rx_errors,
                tx_errors: current.tx_errors,
                rx_drops: current.rx_drops,
                tx_drops: current.tx_drops,
            }));
        }

        Ok(metrics)
    }
}

// ============================================================================
// TEMPERATURE / WIFI
// ============================================================================

struct TemperatureSampler;

impl Sampler for TemperatureSampler {
    fn name(&self) -> &'static str {
        "temperature"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        match thermal::read_temperatures() {
            Ok(readings) => Ok(readings.into_iter().map(Metric::Temperature).collect()),
            Err(crate::Error::NotSupported) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

struct WifiSampler;

impl Sampler for WifiSampler {
    fn name(&self) -> &'static str {
        "wifi"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        Ok(wireless::read_wifi()?.into_iter().map(Metric::Wifi).collect())
    }
}

// ============================================================================
// SYSTEM
// ============================================================================

struct SystemSampler;

impl Sampler for SystemSampler {
    fn name(&self) -> &'static str {
        "system"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        let uptime = procfs::read_uptime()?;
        let (os, kernel_version) = procfs::read_os_release();

        Ok(vec![Metric::System(SystemMetric {
            uptime_seconds: uptime as u64,
            boot_time: chrono::Utc::now().timestamp() - uptime as i64,
            os,
            kernel_version,
        })])
    }
}

// ============================================================================
// PROCESSES
// ============================================================================

/// Bounded process snapshot: the heaviest processes by resident memory.
struct ProcessSampler;

impl Sampler for ProcessSampler {
    fn name(&self) -> &'static str {
        "process_list"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        let mem_total = procfs::MemInfo::read().map(|m| m.mem_total).unwrap_or(0);
        let pids = procfs::list_processes()?;
        let total = pids.len() as u32;

        let mut processes: Vec<ProcessMetric> = pids
            .into_iter()
            .filter_map(|pid| {
                let stat = procfs::ProcessStat::read(pid).ok()?;
                let status = procfs::ProcessStatus::read(pid).ok()?;

                let memory_percent = if mem_total > 0 {
                    status.vm_rss as f64 / mem_total as f64 * 100.0
                } else {
                    0.0
                };

                Some(ProcessMetric {
                    pid,
                    name: stat.name,
                    cpu_percent: 0.0,
                    memory_rss_bytes: status.vm_rss,
                    memory_vms_bytes: status.vm_size,
                    memory_percent,
                    num_threads: stat.num_threads,
                    state: procfs::state_name(stat.state).to_string(),
                })
            })
            .collect();

        processes.sort_by(|a, b| b.memory_rss_bytes.cmp(&a.memory_rss_bytes));
        processes.truncate(PROCESS_LIST_LIMIT);

        Ok(vec![Metric::ProcessList(ProcessListMetric { processes, total })])
    }
}

// ============================================================================
// RASPBERRY PI FIRMWARE
// ============================================================================

/// Clocks, voltages, and throttling state from the Pi firmware. One sampler
/// emits all three metric kinds; on non-Pi hosts it stays silent.
struct FirmwareSampler {
    supported: bool,
}

impl FirmwareSampler {
    fn new() -> Self {
        Self { supported: rpi::is_supported() }
    }
}

impl Sampler for FirmwareSampler {
    fn name(&self) -> &'static str {
        "firmware"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        if !self.supported {
            return Ok(Vec::new());
        }

        let mut metrics = Vec::new();
        metrics.extend(rpi::read_clocks()?.into_iter().map(Metric::Clock));
        metrics.extend(rpi::read_voltages()?.into_iter().map(Metric::Voltage));
        if let Some(throttle) = rpi::read_throttle()? {
            metrics.push(Metric::Throttle(throttle));
        }

        Ok(metrics)
    }
}

// ============================================================================
// NIGHTLY INVENTORY
// ============================================================================

struct ApplicationListSampler;

impl Sampler for ApplicationListSampler {
    fn name(&self) -> &'static str {
        "application_list"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        let applications = inventory::read_applications()?;
        Ok(vec![Metric::ApplicationList(spectra_metrics::ApplicationListMetric { applications })])
    }
}

struct ServiceListSampler;

impl Sampler for ServiceListSampler {
    fn name(&self) -> &'static str {
        "service_list"
    }

    fn sample(&mut self) -> Result<Vec<Metric>> {
        let services = inventory::read_services()?;
        Ok(vec![Metric::ServiceList(spectra_metrics::ServiceListMetric { services })])
    }
}
