//! The closed set of metric variants and their wire payloads.
//!
//! `Metric` is a tagged union: each variant carries one payload struct and a
//! fixed tag string. The envelope writes the tag next to the payload; the
//! receive path resolves the payload back to a variant by switching on it.
//! New metric kinds are added here, never registered at runtime.

use crate::Error;
use serde::{Deserialize, Serialize};

/// System CPU usage plus load averages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuMetric {
    /// User CPU percentage (0-100).
    pub user_percent: f64,
    /// System CPU percentage (0-100).
    pub system_percent: f64,
    /// Idle CPU percentage (0-100).
    pub idle_percent: f64,
    /// I/O wait percentage (Linux only, 0 on other platforms).
    pub iowait_percent: f64,
    /// Steal percentage (VMs only, 0 otherwise).
    pub steal_percent: f64,
    /// Number of CPU cores.
    pub cores: u32,
    /// CPU frequency in MHz.
    pub frequency_mhz: u64,
    /// 1-minute load average.
    pub load_1min: f64,
    /// 5-minute load average.
    pub load_5min: f64,
    /// 15-minute load average.
    pub load_15min: f64,
}

/// System memory usage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetric {
    /// Total physical memory in bytes.
    pub total_bytes: u64,
    /// Available memory in bytes.
    pub available_bytes: u64,
    /// Used memory in bytes.
    pub used_bytes: u64,
    /// Used memory as a percentage of total.
    pub used_percent: f64,
    /// Cached memory in bytes.
    pub cached_bytes: u64,
    /// Buffer memory in bytes (Linux only, 0 on other platforms).
    pub buffers_bytes: u64,
    /// Total swap in bytes.
    pub swap_total_bytes: u64,
    /// Used swap in bytes.
    pub swap_used_bytes: u64,
}

/// Disk usage for one mounted filesystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskMetric {
    /// Device path (e.g., /dev/sda1).
    pub device: String,
    /// Mount point (e.g., /).
    pub mountpoint: String,
    /// Filesystem type (e.g., ext4, xfs).
    pub fstype: String,
    /// Total space in bytes.
    pub total_bytes: u64,
    /// Used space in bytes.
    pub used_bytes: u64,
    /// Free space in bytes.
    pub free_bytes: u64,
    /// Usage percentage (0-100).
    pub used_percent: f64,
    /// Total inodes.
    pub inodes_total: u64,
    /// Used inodes.
    pub inodes_used: u64,
    /// Free inodes.
    pub inodes_free: u64,
}

/// Block device I/O rates over the last sampling window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskIoMetric {
    /// Device name (e.g., sda).
    pub device: String,
    /// Read operations per second.
    pub reads_per_sec: f64,
    /// Write operations per second.
    pub writes_per_sec: f64,
    /// Bytes read per second.
    pub read_bytes_per_sec: u64,
    /// Bytes written per second.
    pub write_bytes_per_sec: u64,
    /// Share of the window spent doing I/O (0-100).
    pub busy_percent: f64,
}

/// Network interface rates over the last sampling window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkMetric {
    /// Interface name (e.g., eth0).
    pub interface: String,
    /// Bytes received per second.
    pub rx_bytes_per_sec: u64,
    /// Bytes transmitted per second.
    pub tx_bytes_per_sec: u64,
    /// Packets received per second.
    pub rx_packets_per_sec: f64,
    /// Packets transmitted per second.
    pub tx_packets_per_sec: f64,
    /// Total receive errors.
    pub rx_errors: u64,
    /// Total transmit errors.
    pub tx_errors: u64,
    /// Total receive drops.
    pub rx_drops: u64,
    /// Total transmit drops.
    pub tx_drops: u64,
}

/// One temperature sensor reading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemperatureMetric {
    /// Sensor device name (e.g., "coretemp", "acpitz", "nvme").
    pub sensor: String,
    /// Sensor label (e.g., "Core 0", "Package id 0").
    pub label: String,
    /// Current temperature in Celsius.
    pub celsius: f64,
    /// Maximum safe temperature in Celsius (if available).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_celsius: Option<f64>,
    /// Critical temperature in Celsius (if available).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_celsius: Option<f64>,
}

/// Host-level identity and uptime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetric {
    /// Seconds since boot.
    pub uptime_seconds: u64,
    /// Boot instant as Unix seconds.
    pub boot_time: i64,
    /// Operating system name (e.g., "Linux").
    pub os: String,
    /// Kernel release string.
    pub kernel_version: String,
}

/// Metrics for a single process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessMetric {
    /// Process ID.
    pub pid: i32,
    /// Process name.
    pub name: String,
    /// CPU usage percentage (0-100 per core).
    pub cpu_percent: f64,
    /// Resident set size in bytes.
    pub memory_rss_bytes: u64,
    /// Virtual memory size in bytes.
    pub memory_vms_bytes: u64,
    /// Memory usage percentage.
    pub memory_percent: f64,
    /// Number of threads.
    pub num_threads: u32,
    /// Process state string ("running", "sleeping", ...).
    pub state: String,
}

/// A bounded snapshot of the heaviest processes plus the total count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessListMetric {
    /// Heaviest processes by resident memory.
    pub processes: Vec<ProcessMetric>,
    /// Total number of processes on the host.
    pub total: u32,
}

/// Wireless link state for one interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WifiMetric {
    /// Interface name (e.g., wlan0).
    pub interface: String,
    /// Associated network name, empty when unknown.
    pub ssid: String,
    /// Signal level in dBm.
    pub signal_dbm: i32,
    /// Link quality as a percentage (0-100).
    pub link_quality: f64,
    /// Noise level in dBm.
    pub noise_dbm: i32,
}

/// One clock domain frequency (Raspberry Pi).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClockMetric {
    /// Clock domain (e.g., "arm", "core").
    pub name: String,
    /// Measured frequency in Hz.
    pub frequency_hz: u64,
}

/// One voltage rail reading (Raspberry Pi).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoltageMetric {
    /// Rail name (e.g., "core", "sdram_c").
    pub rail: String,
    /// Measured volts.
    pub volts: f64,
}

/// Firmware throttling state (Raspberry Pi).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleMetric {
    /// Raw bitmask from the firmware.
    pub raw: u32,
    /// Under-voltage detected right now.
    pub under_voltage: bool,
    /// Frequency capped right now.
    pub frequency_capped: bool,
    /// Throttled right now.
    pub throttled: bool,
    /// Soft temperature limit active right now.
    pub soft_temp_limit: bool,
    /// Under-voltage has occurred since boot.
    pub under_voltage_occurred: bool,
    /// Frequency capping has occurred since boot.
    pub frequency_capped_occurred: bool,
    /// Throttling has occurred since boot.
    pub throttled_occurred: bool,
    /// Soft temperature limit has occurred since boot.
    pub soft_temp_limit_occurred: bool,
}

/// GPU utilization snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpuMetric {
    /// Adapter name.
    pub name: String,
    /// GPU temperature in Celsius.
    pub temp_celsius: f64,
    /// Total adapter memory in bytes.
    pub memory_total_bytes: u64,
    /// Used adapter memory in bytes.
    pub memory_used_bytes: u64,
    /// Utilization percentage (0-100).
    pub utilization_percent: f64,
}

/// State of a single supervised service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceMetric {
    /// Unit or service name.
    pub name: String,
    /// High-level activation state ("active", "failed", ...).
    pub active_state: String,
    /// Fine-grained state ("running", "exited", ...).
    pub sub_state: String,
    /// Whether the unit definition is loaded.
    pub loaded: bool,
}

/// Nightly inventory of services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceListMetric {
    pub services: Vec<ServiceMetric>,
}

/// One installed package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationInfo {
    /// Package name.
    pub name: String,
    /// Installed version string.
    pub version: String,
}

/// Nightly inventory of installed packages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationListMetric {
    pub applications: Vec<ApplicationInfo>,
}

/// Resource usage of one container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerMetric {
    /// Container ID.
    pub id: String,
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Runtime state ("running", "exited", ...).
    pub state: String,
    /// CPU usage percentage.
    pub cpu_percent: f64,
    /// Memory usage in bytes.
    pub memory_bytes: u64,
}

/// Inventory of containers on the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerListMetric {
    pub containers: Vec<ContainerMetric>,
}

// ============================================================================
// THE TAGGED UNION
// ============================================================================

/// A single collected metric.
///
/// Serialization emits only the payload fields; the tag travels in the
/// envelope. The set of variants is closed.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Metric {
    Cpu(CpuMetric),
    Memory(MemoryMetric),
    Disk(DiskMetric),
    DiskIo(DiskIoMetric),
    Network(NetworkMetric),
    Temperature(TemperatureMetric),
    System(SystemMetric),
    Process(ProcessMetric),
    ProcessList(ProcessListMetric),
    Wifi(WifiMetric),
    Clock(ClockMetric),
    Voltage(VoltageMetric),
    Throttle(ThrottleMetric),
    Gpu(GpuMetric),
    Service(ServiceMetric),
    ServiceList(ServiceListMetric),
    ApplicationList(ApplicationListMetric),
    Container(ContainerMetric),
    ContainerList(ContainerListMetric),
}

impl Metric {
    /// The wire tag for this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            Metric::Cpu(_) => "cpu",
            Metric::Memory(_) => "memory",
            Metric::Disk(_) => "disk",
            Metric::DiskIo(_) => "disk_io",
            Metric::Network(_) => "network",
            Metric::Temperature(_) => "temperature",
            Metric::System(_) => "system",
            Metric::Process(_) => "process",
            Metric::ProcessList(_) => "process_list",
            Metric::Wifi(_) => "wifi",
            Metric::Clock(_) => "clock",
            Metric::Voltage(_) => "voltage",
            Metric::Throttle(_) => "throttle",
            Metric::Gpu(_) => "gpu",
            Metric::Service(_) => "service",
            Metric::ServiceList(_) => "service_list",
            Metric::ApplicationList(_) => "application_list",
            Metric::Container(_) => "container",
            Metric::ContainerList(_) => "container_list",
        }
    }

    /// Resolve a raw payload back to a variant by its tag.
    ///
    /// Used on the receive path; an unknown tag is an error the caller logs
    /// and skips, never a crash.
    pub fn from_tagged(tag: &str, data: serde_json::Value) -> crate::Result<Self> {
        fn de<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> crate::Result<T> {
            serde_json::from_value(data).map_err(|e| Error::Malformed(e.to_string()))
        }

        Ok(match tag {
            "cpu" => Metric::Cpu(de(data)?),
            "memory" => Metric::Memory(de(data)?),
            "disk" => Metric::Disk(de(data)?),
            "disk_io" => Metric::DiskIo(de(data)?),
            "network" => Metric::Network(de(data)?),
            "temperature" => Metric::Temperature(de(data)?),
            "system" => Metric::System(de(data)?),
            "process" => Metric::Process(de(data)?),
            "process_list" => Metric::ProcessList(de(data)?),
            "wifi" => Metric::Wifi(de(data)?),
            "clock" => Metric::Clock(de(data)?),
            "voltage" => Metric::Voltage(de(data)?),
            "throttle" => Metric::Throttle(de(data)?),
            "gpu" => Metric::Gpu(de(data)?),
            "service" => Metric::Service(de(data)?),
            "service_list" => Metric::ServiceList(de(data)?),
            "application_list" => Metric::ApplicationList(de(data)?),
            "container" => Metric::Container(de(data)?),
            "container_list" => Metric::ContainerList(de(data)?),
            other => return Err(Error::Malformed(format!("unknown metric type {:?}", other))),
        })
    }
}

#[cfg(test)]
pub(crate) fn all_variants_for_test() -> Vec<Metric> {
    vec![
        Metric::Cpu(CpuMetric::default()),
        Metric::Memory(MemoryMetric::default()),
        Metric::Disk(DiskMetric::default()),
        Metric::DiskIo(DiskIoMetric::default()),
        Metric::Network(NetworkMetric::default()),
        Metric::Temperature(TemperatureMetric::default()),
        Metric::System(SystemMetric::default()),
        Metric::Process(ProcessMetric::default()),
        Metric::ProcessList(ProcessListMetric::default()),
        Metric::Wifi(WifiMetric::default()),
        Metric::Clock(ClockMetric::default()),
        Metric::Voltage(VoltageMetric::default()),
        Metric::Throttle(ThrottleMetric::default()),
        Metric::Gpu(GpuMetric::default()),
        Metric::Service(ServiceMetric::default()),
        Metric::ServiceList(ServiceListMetric::default()),
        Metric::ApplicationList(ApplicationListMetric::default()),
        Metric::Container(ContainerMetric::default()),
        Metric::ContainerList(ContainerListMetric::default()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_unique() {
        let mut tags: Vec<&str> = all_variants_for_test().iter().map(|m| m.tag()).collect();
        let before = tags.len();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), before);
    }

    #[test]
    fn from_tagged_rejects_unknown() {
        let err = Metric::from_tagged("bogus", serde_json::json!({}));
        assert!(err.is_err());
    }

    #[test]
    fn metric_serializes_payload_only() {
        let m = Metric::Clock(ClockMetric { name: "arm".into(), frequency_hz: 1_500_000_000 });
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json, serde_json::json!({"name": "arm", "frequency_hz": 1_500_000_000u64}));
    }
}
