//! spectra-cache - Shared drive/mount cache
//!
//! The agent keeps one process-wide map of block devices to their mounts.
//! A single mount-manager task refreshes it periodically; samplers and
//! command handlers only read. Reads never block other reads.

use parking_lot::RwLock;
use spectra_metrics::MountInfo;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Inner state guarded by the lock.
#[derive(Default)]
struct DriveMap {
    mounts: HashMap<String, MountInfo>,
    refreshed_at: Option<Instant>,
}

/// Thread-safe map of normalized device ids to mount information.
///
/// Created at agent start, written only by the mount manager, read by the
/// disk samplers and the command handlers, dropped on shutdown.
#[derive(Default)]
pub struct DriveCache {
    inner: RwLock<DriveMap>,
}

impl DriveCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole mapping with a fresh enumeration.
    ///
    /// Entries are keyed by the normalized device id carried in
    /// `MountInfo.device` after the platform layer's basename/index
    /// normalization.
    pub fn replace_all(&self, mounts: Vec<MountInfo>) {
        let mut map = HashMap::with_capacity(mounts.len());
        for mount in mounts {
            map.insert(normalize_device(&mount.device), mount);
        }
        let mut inner = self.inner.write();
        log::debug!("drive cache refreshed: {} mounts", map.len());
        inner.mounts = map;
        inner.refreshed_at = Some(Instant::now());
    }

    /// Look up one device by its normalized id.
    pub fn get(&self, device: &str) -> Option<MountInfo> {
        self.inner.read().mounts.get(&normalize_device(device)).cloned()
    }

    /// Snapshot of all known mounts.
    pub fn snapshot(&self) -> Vec<MountInfo> {
        let mut mounts: Vec<MountInfo> = self.inner.read().mounts.values().cloned().collect();
        mounts.sort_by(|a, b| a.mountpoint.cmp(&b.mountpoint));
        mounts
    }

    /// Normalized ids of all known devices.
    pub fn devices(&self) -> Vec<String> {
        self.inner.read().mounts.keys().cloned().collect()
    }

    /// The default scan path: the root mountpoint when present, otherwise
    /// the lexically first mountpoint, otherwise "/".
    pub fn default_path(&self) -> String {
        let inner = self.inner.read();
        if inner.mounts.values().any(|m| m.mountpoint == "/") {
            return "/".to_string();
        }
        inner
            .mounts
            .values()
            .map(|m| m.mountpoint.clone())
            .min()
            .unwrap_or_else(|| "/".to_string())
    }

    /// Whether the cache has not been refreshed within `ttl`.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        match self.inner.read().refreshed_at {
            Some(at) => at.elapsed() >= ttl,
            None => true,
        }
    }

    /// Number of cached mounts.
    pub fn len(&self) -> usize {
        self.inner.read().mounts.len()
    }

    /// Whether the cache holds no mounts.
    pub fn is_empty(&self) -> bool {
        self.inner.read().mounts.is_empty()
    }
}

/// Key devices by basename so `/dev/sda1` and `sda1` agree.
fn normalize_device(device: &str) -> String {
    device.rsplit('/').next().unwrap_or(device).to_string()
}
