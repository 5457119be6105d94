//! Mount manager: keeps the drive cache fresh.
//!
//! The supervisor performs one eager refresh before any cache-dependent
//! sampler starts; after that, this task refreshes every 30 seconds until
//! cancelled.

use spectra_cache::DriveCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Refresh cadence.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// One enumeration pass into the cache.
pub fn refresh_once(drives: &DriveCache) {
    match spectra_platform::list_mounts() {
        Ok(mounts) => drives.replace_all(mounts),
        Err(e) => log::warn!("mount enumeration failed: {}", e),
    }
}

/// Spawn the periodic refresh task.
pub fn spawn_mount_manager(
    drives: Arc<DriveCache>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        // The immediate first tick duplicates the supervisor's eager refresh
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let drives = drives.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || refresh_once(&drives)).await {
                log::warn!("mount refresh task failed: {}", e);
            }
        }

        log::debug!("mount manager stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn eager_refresh_populates_cache() {
        let drives = DriveCache::new();
        assert!(drives.is_stale(REFRESH_INTERVAL));
        refresh_once(&drives);
        assert!(!drives.is_stale(REFRESH_INTERVAL));
    }

    #[tokio::test]
    async fn manager_task_exits_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = spawn_mount_manager(Arc::new(DriveCache::new()), cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
