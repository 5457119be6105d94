//! Sampler scheduling: one task per sampler.
//!
//! Periodic samplers tick on a monotonic interval; nightly samplers sleep
//! until the next wall-clock occurrence of their run time, recomputed after
//! every run so restarts and DST shifts stay correct. All tasks exit
//! promptly on cancellation, and a blocked metrics channel can never wedge a
//! task because every send selects on the cancel token.

use chrono::TimeZone;
use spectra_metrics::{Envelope, Sampler, SamplerSpec};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawn the tick loop for one periodic sampler.
pub fn spawn_periodic(
    spec: SamplerSpec,
    hostname: String,
    tx: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let SamplerSpec { interval, mut sampler } = spec;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !collect_and_send(sampler.as_mut(), &hostname, &tx, &cancel).await {
                break;
            }
        }

        log::debug!("sampler {} stopped", sampler.name());
    })
}

/// Spawn one nightly job running at the local wall-clock (hour, minute).
pub fn spawn_nightly(
    hour: u32,
    minute: u32,
    mut sampler: Box<dyn Sampler>,
    hostname: String,
    tx: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = duration_until(hour, minute);
            log::debug!("nightly {} next run in {}s", sampler.name(), wait.as_secs());

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            if !collect_and_send(sampler.as_mut(), &hostname, &tx, &cancel).await {
                break;
            }
        }
    })
}

/// Run one sampler invocation and forward its metrics. Returns false when
/// the task should stop (cancellation or a closed channel).
async fn collect_and_send(
    sampler: &mut dyn Sampler,
    hostname: &str,
    tx: &mpsc::Sender<Envelope>,
    cancel: &CancellationToken,
) -> bool {
    let metrics = match sampler.sample() {
        Ok(metrics) => metrics,
        Err(e) => {
            log::warn!("sampler {} failed: {}", sampler.name(), e);
            return true; // next tick retries
        }
    };

    for metric in metrics {
        let envelope = Envelope::new(hostname, metric);
        tokio::select! {
            _ = cancel.cancelled() => return false,
            sent = tx.send(envelope) => {
                if sent.is_err() {
                    return false;
                }
            }
        }
    }

    true
}

/// Time until the next local occurrence of (hour, minute).
///
/// Skips forward over days where the local time does not exist (DST gaps);
/// ambiguous times resolve to the earlier instant.
fn duration_until(hour: u32, minute: u32) -> Duration {
    let now = chrono::Local::now();
    let mut date = now.date_naive();

    for _ in 0..3 {
        if let Some(naive) = date.and_hms_opt(hour, minute, 0)
            && let Some(next) = chrono::Local.from_local_datetime(&naive).earliest()
            && next > now
        {
            return (next - now).to_std().unwrap_or(Duration::from_secs(1));
        }
        date = match date.succ_opt() {
            Some(next_day) => next_day,
            None => break,
        };
    }

    // Unreachable with a sane clock
    Duration::from_secs(24 * 60 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectra_metrics::{ClockMetric, Metric, Result};

    /// Emits one clock metric per call, counting invocations.
    struct CountingSampler {
        calls: u64,
    }

    impl Sampler for CountingSampler {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn sample(&mut self) -> Result<Vec<Metric>> {
            self.calls += 1;
            Ok(vec![Metric::Clock(ClockMetric {
                name: "test".to_string(),
                frequency_hz: self.calls,
            })])
        }
    }

    /// Always fails.
    struct FailingSampler;

    impl Sampler for FailingSampler {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn sample(&mut self) -> Result<Vec<Metric>> {
            Err(spectra_metrics::Error::Platform("broken".into()))
        }
    }

    #[tokio::test]
    async fn periodic_sampler_emits_stamped_envelopes() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let spec = SamplerSpec::new(
            Duration::from_millis(10),
            Box::new(CountingSampler { calls: 0 }),
        );
        let handle = spawn_periodic(spec, "host-x".to_string(), tx, cancel.clone());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.hostname, "host-x");
        assert_eq!(first.kind(), "clock");

        let second = rx.recv().await.unwrap();
        match second.data {
            Metric::Clock(clock) => assert_eq!(clock.frequency_hz, 2),
            other => panic!("unexpected variant {}", other.tag()),
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn failing_sampler_keeps_ticking_until_cancelled() {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let spec = SamplerSpec::new(Duration::from_millis(5), Box::new(FailingSampler));
        let handle = spawn_periodic(spec, "host-x".to_string(), tx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        handle.await.unwrap();
        drop(rx);
    }

    #[tokio::test]
    async fn blocked_channel_does_not_wedge_cancellation() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        // Capacity 1 and no consumer: the second send blocks
        let spec = SamplerSpec::new(
            Duration::from_millis(1),
            Box::new(CountingSampler { calls: 0 }),
        );
        let handle = spawn_periodic(spec, "host-x".to_string(), tx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        // Must exit despite the full channel
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[test]
    fn next_nightly_run_is_within_a_day() {
        let wait = duration_until(2, 0);
        assert!(wait <= Duration::from_secs(24 * 60 * 60) + Duration::from_secs(60));
        assert!(wait > Duration::ZERO);
    }
}
