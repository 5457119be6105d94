//! One-shot server registration with exponential backoff.
//!
//! Registration is plain JSON (no gzip) and success is 200 or 201. A final
//! failure is logged and the agent keeps running; the server will still see
//! the host once metrics arrive.

use reqwest::Client;
use spectra_metrics::HostInfo;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Backoff schedule for registration attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// POST the host record until it sticks or the attempts run out. Returns
/// whether registration succeeded.
pub async fn register_with_retry(
    client: &Client,
    url: &str,
    host: &HostInfo,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> bool {
    let mut delay = policy.initial_delay;

    for attempt in 1..=policy.max_attempts {
        match try_register(client, url, host).await {
            Ok(()) => {
                log::info!("registered {} with {}", host.hostname, url);
                return true;
            }
            Err(e) => {
                log::warn!(
                    "registration attempt {}/{} failed: {}",
                    attempt,
                    policy.max_attempts,
                    e
                );
            }
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = delay.mul_f64(policy.multiplier).min(policy.max_delay);
        }
    }

    log::error!("giving up on registration after {} attempts", policy.max_attempts);
    false
}

async fn try_register(client: &Client, url: &str, host: &HostInfo) -> Result<(), String> {
    let response = client.post(url).json(host).send().await.map_err(|e| e.to_string())?;

    match response.status().as_u16() {
        200 | 201 => Ok(()),
        status => Err(format!("server answered {}", status)),
    }
}
