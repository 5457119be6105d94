//! Batch uploader: drains the metrics channel into size- or time-triggered
//! compressed POSTs.
//!
//! Transport is lossy by design: a rejected or failed batch is logged and
//! dropped, never retried. On cancellation the channel is drained and the
//! final batch flushed before the task exits.

use crate::transport::{self, GzipScratch};
use reqwest::Client;
use spectra_metrics::Envelope;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Envelopes per batch before a flush is forced.
pub const MAX_BATCH: usize = 100;

/// Idle flush period.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

pub struct Uploader {
    client: Client,
    url: String,
    gzip: Arc<GzipScratch>,
}

impl Uploader {
    pub fn new(client: Client, url: String, gzip: Arc<GzipScratch>) -> Self {
        Self { client, url, gzip }
    }

    /// Spawn the drain loop.
    pub fn spawn(
        self,
        rx: mpsc::Receiver<Envelope>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(rx, cancel))
    }

    async fn run(self, mut rx: mpsc::Receiver<Envelope>, cancel: CancellationToken) {
        let mut batch: Vec<Envelope> = Vec::with_capacity(MAX_BATCH);
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                // Shutdown wins over a ready tick so the final drain happens
                // in one pass
                biased;
                _ = cancel.cancelled() => {
                    // Drain whatever producers enqueued before they stopped
                    while let Ok(envelope) = rx.try_recv() {
                        batch.push(envelope);
                        if batch.len() >= MAX_BATCH {
                            self.flush(&mut batch).await;
                        }
                    }
                    self.flush(&mut batch).await;
                    break;
                }
                received = rx.recv() => match received {
                    Some(envelope) => {
                        batch.push(envelope);
                        if batch.len() >= MAX_BATCH {
                            self.flush(&mut batch).await;
                        }
                    }
                    // Every producer is gone
                    None => {
                        self.flush(&mut batch).await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await;
                    }
                }
            }
        }

        log::debug!("uploader stopped");
    }

    /// Encode, compress, and POST one batch. The batch is consumed whether
    /// or not the upload succeeds.
    async fn flush(&self, batch: &mut Vec<Envelope>) {
        if batch.is_empty() {
            return;
        }

        let count = batch.len();
        let encoded = serde_json::to_vec(&batch);
        batch.clear();

        let body = match encoded {
            Ok(body) => body,
            Err(e) => {
                log::error!("encoding metrics batch failed: {}", e);
                return;
            }
        };

        let compressed = match self.gzip.compress(&body) {
            Ok(compressed) => compressed,
            Err(e) => {
                log::error!("compressing metrics batch failed: {}", e);
                return;
            }
        };

        match transport::post_gzip(&self.client, &self.url, compressed).await {
            Ok(status) if status.is_success() => {
                log::debug!("uploaded {} metrics", count);
            }
            Ok(status) => {
                log::warn!("server rejected metrics batch ({}), dropping {} metrics", status, count);
            }
            Err(e) => {
                log::warn!("metrics upload failed, dropping {} metrics: {}", count, e);
            }
        }
    }
}
