//! /proc filesystem parsing for Linux
//!
//! Raw counter reads under /proc; rate and percentage math lives in the
//! samplers so each one can keep its own previous-sample state.

use crate::{Error, MountInfo, Result};
use std::fs;

/// CPU time counters from the aggregate line of /proc/stat, in ticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    /// Read and parse the first line of /proc/stat.
    pub fn read() -> Result<Self> {
        Self::parse(&fs::read_to_string("/proc/stat")?)
    }

    /// Parse the aggregate "cpu" line out of /proc/stat content.
    pub fn parse(content: &str) -> Result<Self> {
        let line = content
            .lines()
            .next()
            .ok_or_else(|| Error::Platform("empty /proc/stat".into()))?;

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 9 || parts[0] != "cpu" {
            return Err(Error::Platform("invalid /proc/stat format".into()));
        }

        Ok(Self {
            user: parts[1].parse().unwrap_or(0),
            nice: parts[2].parse().unwrap_or(0),
            system: parts[3].parse().unwrap_or(0),
            idle: parts[4].parse().unwrap_or(0),
            iowait: parts[5].parse().unwrap_or(0),
            irq: parts[6].parse().unwrap_or(0),
            softirq: parts[7].parse().unwrap_or(0),
            steal: parts[8].parse().unwrap_or(0),
        })
    }

    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Counter-wise difference against an earlier reading.
    pub fn delta(&self, prev: &CpuTimes) -> CpuTimes {
        CpuTimes {
            user: self.user.saturating_sub(prev.user),
            nice: self.nice.saturating_sub(prev.nice),
            system: self.system.saturating_sub(prev.system),
            idle: self.idle.saturating_sub(prev.idle),
            iowait: self.iowait.saturating_sub(prev.iowait),
            irq: self.irq.saturating_sub(prev.irq),
            softirq: self.softirq.saturating_sub(prev.softirq),
            steal: self.steal.saturating_sub(prev.steal),
        }
    }
}

/// CPU information from /proc/cpuinfo.
#[derive(Debug, Default)]
pub struct CpuInfo {
    /// Number of CPU cores.
    pub num_cores: u32,
    /// CPU frequency in MHz.
    pub frequency_mhz: u64,
}

impl CpuInfo {
    /// Read and parse /proc/cpuinfo.
    pub fn read() -> Result<Self> {
        let content = fs::read_to_string("/proc/cpuinfo")?;
        let mut num_cores = 0u32;
        let mut frequency_mhz = 0u64;

        for line in content.lines() {
            if line.starts_with("processor") {
                num_cores += 1;
            } else if line.starts_with("cpu MHz")
                && let Some(value) = line.split(':').nth(1)
                && let Ok(freq) = value.trim().parse::<f64>()
            {
                frequency_mhz = freq as u64;
            }
        }

        Ok(Self { num_cores, frequency_mhz })
    }
}

/// Memory information from /proc/meminfo.
#[derive(Debug, Default)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_available: u64,
    pub buffers: u64,
    pub cached: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

impl MemInfo {
    /// Read and parse /proc/meminfo.
    pub fn read() -> Result<Self> {
        Ok(Self::parse(&fs::read_to_string("/proc/meminfo")?))
    }

    /// Parse /proc/meminfo content. Values are in kB, converted to bytes.
    pub fn parse(content: &str) -> Self {
        let mut info = Self::default();

        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 {
                continue;
            }

            let value: u64 = parts[1].parse().unwrap_or(0) * 1024;

            match parts[0] {
                "MemTotal:" => info.mem_total = value,
                "MemFree:" => info.mem_free = value,
                "MemAvailable:" => info.mem_available = value,
                "Buffers:" => info.buffers = value,
                "Cached:" => info.cached = value,
                "SwapTotal:" => info.swap_total = value,
                "SwapFree:" => info.swap_free = value,
                _ => {}
            }
        }

        info
    }
}

/// Load average from /proc/loadavg.
#[derive(Debug, Default)]
pub struct LoadAvg {
    pub load_1min: f64,
    pub load_5min: f64,
    pub load_15min: f64,
}

impl LoadAvg {
    /// Read and parse /proc/loadavg.
    pub fn read() -> Result<Self> {
        let content = fs::read_to_string("/proc/loadavg")?;
        let parts: Vec<&str> = content.split_whitespace().collect();

        if parts.len() < 3 {
            return Err(Error::Platform("invalid /proc/loadavg format".into()));
        }

        Ok(Self {
            load_1min: parts[0].parse().unwrap_or(0.0),
            load_5min: parts[1].parse().unwrap_or(0.0),
            load_15min: parts[2].parse().unwrap_or(0.0),
        })
    }
}

/// Seconds since boot from /proc/uptime.
pub fn read_uptime() -> Result<f64> {
    let content = fs::read_to_string("/proc/uptime")?;
    content
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Platform("invalid /proc/uptime format".into()))
}

// ============================================================================
// MOUNTS
// ============================================================================

/// Filesystem types the drive cache ignores. Matched by prefix so cgroup2,
/// nfs4 and fuse.* variants are covered.
const IGNORED_FSTYPES: &[&str] = &[
    "proc", "sysfs", "devtmpfs", "cgroup", "securityfs", "tmpfs", "ramfs", "nfs", "cifs",
    "autofs", "fuse", "overlay",
];

fn is_ignored_fstype(fstype: &str) -> bool {
    IGNORED_FSTYPES.iter().any(|prefix| fstype.starts_with(prefix))
}

/// Read mounted filesystems from /proc/mounts, filtered for the drive cache.
pub fn read_mounts() -> Result<Vec<MountInfo>> {
    Ok(parse_mounts(&fs::read_to_string("/proc/mounts")?))
}

/// Parse /proc/mounts content: pseudo filesystems and loop devices dropped,
/// devices reduced to their basename.
pub fn parse_mounts(content: &str) -> Vec<MountInfo> {
    let mut mounts = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }

        let device = parts[0];
        let mountpoint = parts[1];
        let fstype = parts[2];

        if is_ignored_fstype(fstype) {
            continue;
        }

        let basename = device.rsplit('/').next().unwrap_or(device);
        if basename.starts_with("loop") {
            continue;
        }

        mounts.push(MountInfo {
            device: basename.to_string(),
            mountpoint: mountpoint.to_string(),
            fstype: fstype.to_string(),
        });
    }

    mounts
}

/// Filesystem usage for a mountpoint via statvfs.
#[derive(Debug, Default)]
pub struct FsUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub used_percent: f64,
    pub inodes_total: u64,
    pub inodes_used: u64,
    pub inodes_free: u64,
}

/// Read disk usage for a path using statvfs.
pub fn read_fs_usage(path: &str) -> Result<FsUsage> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;

    let c_path = CString::new(path).map_err(|_| Error::Platform("invalid path".into()))?;

    let mut stat: MaybeUninit<libc::statvfs> = MaybeUninit::uninit();

    let ret = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };

    if ret != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }

    let stat = unsafe { stat.assume_init() };

    let block_size = stat.f_frsize;
    let total_bytes = stat.f_blocks * block_size;
    let free_bytes = stat.f_bfree * block_size;
    let available_bytes = stat.f_bavail * block_size;
    let used_bytes = total_bytes.saturating_sub(free_bytes);

    let used_percent =
        if total_bytes > 0 { (used_bytes as f64 / total_bytes as f64) * 100.0 } else { 0.0 };

    Ok(FsUsage {
        total_bytes,
        used_bytes,
        free_bytes: available_bytes,
        used_percent,
        inodes_total: stat.f_files,
        inodes_used: stat.f_files.saturating_sub(stat.f_ffree),
        inodes_free: stat.f_ffree,
    })
}

// ============================================================================
// DISK I/O
// ============================================================================

/// Raw I/O counters for one block device from /proc/diskstats.
#[derive(Debug, Clone, Default)]
pub struct DiskCounters {
    pub device: String,
    pub reads_completed: u64,
    pub sectors_read: u64,
    pub writes_completed: u64,
    pub sectors_written: u64,
    pub io_time_ms: u64,
}

/// Read raw I/O counters from /proc/diskstats. Every device is returned;
/// callers filter against the drive cache.
pub fn read_diskstats() -> Result<Vec<DiskCounters>> {
    Ok(parse_diskstats(&fs::read_to_string("/proc/diskstats")?))
}

/// Parse /proc/diskstats content.
pub fn parse_diskstats(content: &str) -> Vec<DiskCounters> {
    let mut stats = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue;
        }

        stats.push(DiskCounters {
            device: parts[2].to_string(),
            reads_completed: parts[3].parse().unwrap_or(0),
            sectors_read: parts[5].parse().unwrap_or(0),
            writes_completed: parts[7].parse().unwrap_or(0),
            sectors_written: parts[9].parse().unwrap_or(0),
            io_time_ms: parts[12].parse().unwrap_or(0),
        });
    }

    stats
}

// ============================================================================
// NETWORK
// ============================================================================

/// Raw counters for one interface from /proc/net/dev.
#[derive(Debug, Clone, Default)]
pub struct NetCounters {
    pub interface: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_drops: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_drops: u64,
}

/// Read raw interface counters from /proc/net/dev.
pub fn read_net_dev() -> Result<Vec<NetCounters>> {
    Ok(parse_net_dev(&fs::read_to_string("/proc/net/dev")?))
}

/// Parse /proc/net/dev content (two header lines skipped).
pub fn parse_net_dev(content: &str) -> Vec<NetCounters> {
    let mut stats = Vec::new();

    for line in content.lines().skip(2) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 17 {
            continue;
        }

        stats.push(NetCounters {
            interface: parts[0].trim_end_matches(':').to_string(),
            rx_bytes: parts[1].parse().unwrap_or(0),
            rx_packets: parts[2].parse().unwrap_or(0),
            rx_errors: parts[3].parse().unwrap_or(0),
            rx_drops: parts[4].parse().unwrap_or(0),
            tx_bytes: parts[9].parse().unwrap_or(0),
            tx_packets: parts[10].parse().unwrap_or(0),
            tx_errors: parts[11].parse().unwrap_or(0),
            tx_drops: parts[12].parse().unwrap_or(0),
        });
    }

    stats
}

// ============================================================================
// PROCESSES
// ============================================================================

/// Read one file under /proc/[pid], mapping a vanished process to NotFound.
fn read_proc_file(pid: i32, file: &str) -> Result<String> {
    fs::read_to_string(format!("/proc/{}/{}", pid, file)).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(format!("process {} not found", pid))
        } else {
            Error::Io(e)
        }
    })
}

/// Per-process fields from /proc/[pid]/stat: the command name plus the
/// scheduling columns the process snapshot reports.
#[derive(Debug, Default)]
pub struct ProcessStat {
    /// Command name, without the surrounding parentheses.
    pub name: String,
    /// Process state character.
    pub state: char,
    /// Number of threads.
    pub num_threads: u32,
    /// User time ticks, input for CPU-rate accounting.
    pub utime: u64,
    /// System time ticks, input for CPU-rate accounting.
    pub stime: u64,
}

impl ProcessStat {
    /// Read and parse /proc/[pid]/stat.
    pub fn read(pid: i32) -> Result<Self> {
        Self::parse(&read_proc_file(pid, "stat")?)
    }

    /// Parse one stat line: `pid (comm) state ppid ... utime stime ...`.
    ///
    /// The comm field may itself contain spaces and parentheses, so the name
    /// runs from the first `(` to the last `)` and columns are counted from
    /// there: state is the first field after it, utime/stime are fields
    /// 11/12, num_threads is field 17.
    pub fn parse(content: &str) -> Result<Self> {
        let open = content
            .find('(')
            .ok_or_else(|| Error::Platform("invalid /proc stat line".into()))?;
        let close = content
            .rfind(')')
            .filter(|&close| close > open)
            .ok_or_else(|| Error::Platform("invalid /proc stat line".into()))?;

        let name = content[open + 1..close].to_string();
        let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();

        if fields.is_empty() {
            return Err(Error::Platform("truncated /proc stat line".into()));
        }

        Ok(Self {
            name,
            state: fields[0].chars().next().unwrap_or('?'),
            utime: fields.get(11).and_then(|s| s.parse().ok()).unwrap_or(0),
            stime: fields.get(12).and_then(|s| s.parse().ok()).unwrap_or(0),
            num_threads: fields.get(17).and_then(|s| s.parse().ok()).unwrap_or(0),
        })
    }
}

/// Process memory from /proc/[pid]/status.
#[derive(Debug, Default)]
pub struct ProcessStatus {
    pub vm_size: u64,
    pub vm_rss: u64,
}

impl ProcessStatus {
    /// Read and parse /proc/[pid]/status.
    pub fn read(pid: i32) -> Result<Self> {
        Ok(Self::parse(&read_proc_file(pid, "status")?))
    }

    /// Parse /proc/[pid]/status content. Values are in kB, converted to
    /// bytes; lines other than VmSize/VmRSS are skipped.
    pub fn parse(content: &str) -> Self {
        let mut status = Self::default();

        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 {
                continue;
            }

            let value: u64 = parts[1].parse().unwrap_or(0) * 1024;

            match parts[0] {
                "VmSize:" => status.vm_size = value,
                "VmRSS:" => status.vm_rss = value,
                _ => {}
            }
        }

        status
    }
}

/// List all process IDs from /proc.
pub fn list_processes() -> Result<Vec<i32>> {
    let mut pids = Vec::new();

    for entry in fs::read_dir("/proc")? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str()
            && let Ok(pid) = name.parse::<i32>()
        {
            pids.push(pid);
        }
    }

    Ok(pids)
}

/// Map a /proc stat state character to a state name.
pub fn state_name(state: char) -> &'static str {
    match state {
        'R' => "running",
        'S' => "sleeping",
        'D' => "waiting",
        'Z' => "zombie",
        'T' | 't' => "stopped",
        'I' => "idle",
        _ => "unknown",
    }
}

// ============================================================================
// HOST IDENTITY
// ============================================================================

/// Kernel identity from /proc/sys/kernel.
pub fn read_os_release() -> (String, String) {
    let os = fs::read_to_string("/proc/sys/kernel/ostype")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "Linux".to_string());
    let kernel = fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    (os, kernel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cpu_times_line() {
        let content = "cpu  100 5 50 800 20 3 7 15 0 0\ncpu0 ...\n";
        let times = CpuTimes::parse(content).unwrap();
        assert_eq!(times.user, 100);
        assert_eq!(times.steal, 15);
        assert_eq!(times.total(), 1000);
    }

    #[test]
    fn cpu_delta_saturates() {
        let newer = CpuTimes { user: 100, ..Default::default() };
        let older = CpuTimes { user: 150, ..Default::default() };
        assert_eq!(newer.delta(&older).user, 0);
    }

    #[test]
    fn parse_meminfo_converts_kb() {
        let content = "MemTotal:       16384 kB\nMemAvailable:    8192 kB\nSwapTotal:       1024 kB\nSwapFree:         512 kB\n";
        let info = MemInfo::parse(content);
        assert_eq!(info.mem_total, 16384 * 1024);
        assert_eq!(info.mem_available, 8192 * 1024);
        assert_eq!(info.swap_total, 1024 * 1024);
    }

    #[test]
    fn parse_mounts_filters_pseudo_and_loop() {
        let content = "\
/dev/sda1 / ext4 rw,relatime 0 0
proc /proc proc rw 0 0
sysfs /sys sysfs rw 0 0
tmpfs /run tmpfs rw 0 0
cgroup2 /sys/fs/cgroup cgroup2 rw 0 0
/dev/loop3 /snap/core squashfs ro 0 0
fuse.sshfs /mnt/remote fuse.sshfs rw 0 0
/dev/nvme0n1p2 /home ext4 rw 0 0
";
        let mounts = parse_mounts(content);
        let devices: Vec<&str> = mounts.iter().map(|m| m.device.as_str()).collect();
        assert_eq!(devices, vec!["sda1", "nvme0n1p2"]);
        assert_eq!(mounts[1].mountpoint, "/home");
    }

    #[test]
    fn parse_diskstats_line() {
        let content =
            "   8       0 sda 5000 20 300000 900 2000 30 150000 400 0 1200 1300 0 0 0 0\n";
        let stats = parse_diskstats(content);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].device, "sda");
        assert_eq!(stats[0].reads_completed, 5000);
        assert_eq!(stats[0].sectors_read, 300000);
        assert_eq!(stats[0].writes_completed, 2000);
        assert_eq!(stats[0].sectors_written, 150000);
        assert_eq!(stats[0].io_time_ms, 1200);
    }

    #[test]
    fn parse_net_dev_skips_headers() {
        let content = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1000     10    0    0    0     0          0         0     1000     10    0    0    0     0       0          0
  eth0: 500000 4000    1    2    0     0          0         0   250000   3000    3    4    0     0       0          0
";
        let stats = parse_net_dev(content);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[1].interface, "eth0");
        assert_eq!(stats[1].rx_bytes, 500000);
        assert_eq!(stats[1].tx_bytes, 250000);
        assert_eq!(stats[1].rx_errors, 1);
        assert_eq!(stats[1].tx_drops, 4);
    }

    #[test]
    fn parse_process_stat_line() {
        let line = "873 (sshd) S 1 873 873 0 -1 4194560 2546 180 1 0 57 12 3 1 20 0 7 0 4321 76800000 900 18446744073709551615 1 1 0 0 0 0 0 4096 81925 0 0 0 17 2 0 0 0 0 0";
        let stat = ProcessStat::parse(line).unwrap();
        assert_eq!(stat.name, "sshd");
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.utime, 57);
        assert_eq!(stat.stime, 12);
        assert_eq!(stat.num_threads, 7);
    }

    #[test]
    fn parse_process_stat_comm_with_spaces_and_parens() {
        // Browsers name worker processes like this; everything between the
        // first '(' and the last ')' is the command
        let line = "4077 (Web Content (2)) R 873 4077 873 0 -1 4194304 99 0 0 0 8 4 0 0 20 0 21 0 9999 150000000 12000 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0";
        let stat = ProcessStat::parse(line).unwrap();
        assert_eq!(stat.name, "Web Content (2)");
        assert_eq!(stat.state, 'R');
        assert_eq!(stat.utime, 8);
        assert_eq!(stat.stime, 4);
        assert_eq!(stat.num_threads, 21);
    }

    #[test]
    fn parse_process_stat_rejects_garbage() {
        assert!(ProcessStat::parse("no parens here").is_err());
        assert!(ProcessStat::parse("12 (comm)").is_err());
        assert!(ProcessStat::parse(") misordered (").is_err());
    }

    #[test]
    fn parse_process_status_converts_kb() {
        let content = "\
Name:   sshd
Umask:  0022
VmPeak:    17376 kB
VmSize:    17340 kB
VmRSS:      5512 kB
Threads:        1
";
        let status = ProcessStatus::parse(content);
        assert_eq!(status.vm_size, 17340 * 1024);
        assert_eq!(status.vm_rss, 5512 * 1024);
    }

    #[test]
    fn read_system_files() {
        // Smoke tests against the live /proc of the build host.
        assert!(CpuTimes::read().is_ok());
        assert!(MemInfo::read().is_ok());
        assert!(LoadAvg::read().is_ok());
        assert!(read_uptime().unwrap() > 0.0);
        assert!(!list_processes().unwrap().is_empty());
        assert!(ProcessStat::read(std::process::id() as i32).is_ok());
    }
}
