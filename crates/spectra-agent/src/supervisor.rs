//! Agent supervisor: owns the shared resources and the task lifecycle.
//!
//! Startup order matters: the drive cache is filled eagerly before any
//! sampler that reads it starts, the uploader is consuming before producers
//! exist, and registration runs last so a slow server never delays
//! collection. Shutdown cancels the root token and joins every spawned task;
//! the uploader flushes its tail batch on the way out.

use crate::config::Config;
use crate::transport::{self, GzipScratch};
use crate::{commands, mounts, registration, scheduler, uploader};
use spectra_cache::DriveCache;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bound on in-flight envelopes between samplers and the uploader.
pub const CHANNEL_CAPACITY: usize = 500;

/// Version string reported at registration.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Agent {
    config: Arc<Config>,
    client: reqwest::Client,
    drives: Arc<DriveCache>,
    gzip: Arc<GzipScratch>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Agent {
    /// Build the shared resources. Nothing runs until [`Agent::start`].
    pub fn new(config: Config) -> reqwest::Result<Self> {
        Ok(Self {
            config: Arc::new(config),
            client: transport::build_client()?,
            drives: Arc::new(DriveCache::new()),
            gzip: Arc::new(GzipScratch::new()),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// The root cancellation token, for signal wiring.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bring every long-lived task up.
    pub async fn start(&mut self) {
        // Mounts first: disk samplers and DISK_USAGE need a warm cache
        let drives = self.drives.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || mounts::refresh_once(&drives)).await {
            log::warn!("eager mount refresh failed: {}", e);
        }
        self.tasks.push(mounts::spawn_mount_manager(self.drives.clone(), self.cancel.clone()));

        // Uploader before any producer
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let metrics_uploader = uploader::Uploader::new(
            self.client.clone(),
            self.config.metrics_url(),
            self.gzip.clone(),
        );
        self.tasks.push(metrics_uploader.spawn(rx, self.cancel.clone()));

        // Samplers
        let hostname = self.config.hostname.clone();
        for spec in spectra_platform::periodic_samplers(self.drives.clone()) {
            self.tasks.push(scheduler::spawn_periodic(
                spec,
                hostname.clone(),
                tx.clone(),
                self.cancel.clone(),
            ));
        }
        for (hour, minute, sampler) in spectra_platform::nightly_samplers() {
            self.tasks.push(scheduler::spawn_nightly(
                hour,
                minute,
                sampler,
                hostname.clone(),
                tx.clone(),
                self.cancel.clone(),
            ));
        }
        // The channel closes once every sampler task is gone
        drop(tx);

        // Command loop
        let command_loop = commands::CommandLoop::new(
            self.client.clone(),
            self.config.clone(),
            self.drives.clone(),
            self.gzip.clone(),
        );
        self.tasks.push(command_loop.spawn(self.cancel.clone()));

        // Registration last; collection never waits on it
        let client = self.client.clone();
        let url = self.config.register_url();
        let host = spectra_platform::host_info(&self.config.hostname, AGENT_VERSION);
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            registration::register_with_retry(
                &client,
                &url,
                &host,
                &registration::RetryPolicy::default(),
                &cancel,
            )
            .await;
        }));

        log::info!(
            "agent started: {} tasks, reporting as {} to {}",
            self.tasks.len(),
            self.config.hostname,
            self.config.base_url
        );
    }

    /// Cancel everything and wait for the tasks to drain and exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                log::warn!("task ended abnormally: {}", e);
            }
        }
        log::info!("agent stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config(base_url: String) -> Config {
        let mut config = Config::from_lookup(|_| None);
        config.base_url = base_url;
        config.hostname = "test-host".to_string();
        config
    }

    #[tokio::test]
    async fn startup_and_clean_shutdown() {
        // No server listening: every upload fails, the agent must not care
        let mut agent = Agent::new(test_config("http://127.0.0.1:9".to_string())).unwrap();
        agent.start().await;
        assert!(!agent.tasks.is_empty());

        let token = agent.cancel_token();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(30), agent.shutdown())
            .await
            .expect("shutdown must join all tasks promptly");
        assert!(token.is_cancelled());
    }
}
