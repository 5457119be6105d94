//! Command loop: poll the server, dispatch, upload results.
//!
//! Every fetched command runs on its own task under a 60-second bound so a
//! stuck handler cannot outlive its budget; blocking analyzers additionally
//! get a child cancellation token that fires when the bound expires. Results
//! upload through the same gzip discipline as metrics and are never retried.

use crate::config::Config;
use crate::transport::{self, GzipScratch};
use reqwest::{Client, StatusCode};
use spectra_cache::DriveCache;
use spectra_metrics::{
    Command, CommandResult, CommandType, DiskUsageRequest, Error, LogRequest, NetworkDiagRequest,
    Result,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wall-clock budget for one command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Default top-N when a DISK_USAGE request leaves it zero.
const DEFAULT_TOP_N: usize = 50;

pub struct CommandLoop {
    client: Client,
    config: Arc<Config>,
    drives: Arc<DriveCache>,
    gzip: Arc<GzipScratch>,
}

impl CommandLoop {
    pub fn new(
        client: Client,
        config: Arc<Config>,
        drives: Arc<DriveCache>,
        gzip: Arc<GzipScratch>,
    ) -> Self {
        Self { client, config, drives, gzip }
    }

    /// Spawn the poll loop.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::new(self).run(cancel))
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Some(command) = self.fetch().await {
                log::info!("dispatching command {} ({:?})", command.id, command.kind);
                let this = self.clone();
                let handler_cancel = cancel.child_token();
                tokio::spawn(async move {
                    this.dispatch(command, handler_cancel).await;
                });
            }
        }

        log::debug!("command loop stopped");
    }

    /// One poll: 200 yields a command, 204 and everything else is a no-op.
    async fn fetch(&self) -> Option<Command> {
        let response = match self.client.get(self.config.command_url()).send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("command fetch failed: {}", e);
                return None;
            }
        };

        match response.status() {
            StatusCode::OK => match response.json::<Command>().await {
                Ok(command) => Some(command),
                Err(e) => {
                    log::warn!("undecodable command dropped: {}", e);
                    None
                }
            },
            StatusCode::NO_CONTENT => None,
            status => {
                log::debug!("command poll returned {}", status);
                None
            }
        }
    }

    /// Run one command under its bound and upload whatever came of it.
    async fn dispatch(&self, command: Command, cancel: CancellationToken) {
        let outcome =
            match tokio::time::timeout(COMMAND_TIMEOUT, self.handle(&command, &cancel)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    // Stop any blocking analyzer still holding the child token
                    cancel.cancel();
                    Err(Error::Cancelled)
                }
            };

        let result = match outcome {
            Ok(payload) => CommandResult::ok(&command, payload),
            Err(e) => {
                log::warn!("command {} failed: {}", command.id, e);
                CommandResult::failed(&command, e)
            }
        };

        self.upload_result(result).await;
    }

    /// The dispatch table.
    async fn handle(
        &self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        match command.kind {
            CommandType::FetchLogs => {
                let request: LogRequest = decode_payload(command)?;
                let entries = run_blocking(move || {
                    spectra_platform::fetch_logs(request.min_level)
                })
                .await?;
                to_json(&entries)
            }
            CommandType::DiskUsage => {
                let request: DiskUsageRequest = decode_payload(command)?;

                let root = if request.path.is_empty() {
                    PathBuf::from(self.drives.default_path())
                } else {
                    PathBuf::from(&request.path)
                };
                let top_n = if request.top_n == 0 { DEFAULT_TOP_N } else { request.top_n };

                let scan_cancel = cancel.clone();
                let report = run_blocking(move || {
                    spectra_diag::scan_top(&root, top_n, top_n, &scan_cancel)
                })
                .await?;
                to_json(&report)
            }
            CommandType::ListMounts => to_json(&self.drives.snapshot()),
            CommandType::NetworkDiag => {
                let request: NetworkDiagRequest = decode_payload(command)?;
                let diag_cancel = cancel.clone();
                let result = run_blocking(move || {
                    spectra_diag::run_network_diag(&request, &diag_cancel)
                })
                .await?;
                to_json(&result)
            }
            CommandType::RestartAgent => {
                Err(Error::NotImplemented("RESTART_AGENT".to_string()))
            }
        }
    }

    /// Upload one result; non-200 is logged and the result is dropped. Each
    /// command id is uploaded at most once.
    async fn upload_result(&self, result: CommandResult) {
        let body = match serde_json::to_vec(&result) {
            Ok(body) => body,
            Err(e) => {
                log::error!("encoding result for {} failed: {}", result.id, e);
                return;
            }
        };

        let compressed = match self.gzip.compress(&body) {
            Ok(compressed) => compressed,
            Err(e) => {
                log::error!("compressing result for {} failed: {}", result.id, e);
                return;
            }
        };

        match transport::post_gzip(&self.client, &self.config.command_result_url(), compressed)
            .await
        {
            Ok(StatusCode::OK) => log::debug!("uploaded result for {}", result.id),
            Ok(status) => log::warn!("result upload for {} rejected: {}", result.id, status),
            Err(e) => log::warn!("result upload for {} failed: {}", result.id, e),
        }
    }
}

/// Decode a command payload, tolerating a missing body for defaultable
/// requests.
fn decode_payload<T: serde::de::DeserializeOwned + Default>(command: &Command) -> Result<T> {
    if command.payload.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(command.payload.clone())
        .map_err(|e| Error::Malformed(format!("command {} payload: {}", command.id, e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| Error::Malformed(e.to_string()))
}

/// Run a blocking analyzer off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Platform(format!("analyzer task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::StatusCode as AxStatus;
    use axum::routing::{get, post};
    use axum::Router;
    use flate2::read::GzDecoder;
    use parking_lot::Mutex;
    use spectra_metrics::MountInfo;
    use std::io::Read;

    #[derive(Clone)]
    struct ServerState {
        /// Commands handed out, one per poll, then 204s.
        pending: Arc<Mutex<Vec<serde_json::Value>>>,
        /// Raw gzipped result bodies.
        results: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    async fn spawn_server(commands: Vec<serde_json::Value>) -> (Arc<Config>, ServerState) {
        let state = ServerState {
            pending: Arc::new(Mutex::new(commands)),
            results: Arc::new(Mutex::new(Vec::new())),
        };

        async fn command(State(state): State<ServerState>) -> (AxStatus, String) {
            let mut pending = state.pending.lock();
            if pending.is_empty() {
                (AxStatus::NO_CONTENT, String::new())
            } else {
                (AxStatus::OK, pending.remove(0).to_string())
            }
        }

        async fn result(State(state): State<ServerState>, body: Bytes) -> AxStatus {
            state.results.lock().push(body.to_vec());
            AxStatus::OK
        }

        let app = Router::new()
            .route("/api/v1/agent/command", get(command))
            .route("/api/v1/agent/command_result", post(result))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = Config::from_lookup(|_| None);
        config.base_url = format!("http://{}", addr);
        config.hostname = "test".to_string();
        config.poll_interval = Duration::from_millis(20);

        (Arc::new(config), state)
    }

    fn decode_result(body: &[u8]) -> CommandResult {
        let mut json = Vec::new();
        GzDecoder::new(body).read_to_end(&mut json).unwrap();
        serde_json::from_slice(&json).unwrap()
    }

    async fn await_results(state: &ServerState, count: usize) -> Vec<CommandResult> {
        for _ in 0..200 {
            if state.results.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let bodies = state.results.lock();
        assert!(bodies.len() >= count, "only {} results arrived", bodies.len());
        bodies.iter().map(|b| decode_result(b)).collect()
    }

    fn command_loop(config: Arc<Config>, drives: Arc<DriveCache>) -> CommandLoop {
        CommandLoop::new(
            transport::build_client().unwrap(),
            config,
            drives,
            Arc::new(GzipScratch::new()),
        )
    }

    #[tokio::test]
    async fn list_mounts_round_trip() {
        let (config, state) = spawn_server(vec![serde_json::json!({
            "id": "cmd-1",
            "type": "LIST_MOUNTS"
        })])
        .await;

        let drives = Arc::new(DriveCache::new());
        drives.replace_all(vec![MountInfo {
            device: "sda1".to_string(),
            mountpoint: "/".to_string(),
            fstype: "ext4".to_string(),
        }]);

        let cancel = CancellationToken::new();
        let handle = command_loop(config, drives).spawn(cancel.clone());

        let results = await_results(&state, 1).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(results[0].id, "cmd-1");
        assert_eq!(results[0].kind, CommandType::ListMounts);
        assert!(results[0].error.is_none());
        let mounts: Vec<MountInfo> =
            serde_json::from_value(results[0].payload.clone().unwrap()).unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].device, "sda1");
    }

    #[tokio::test]
    async fn restart_agent_reports_not_implemented() {
        let (config, state) = spawn_server(vec![serde_json::json!({
            "id": "cmd-2",
            "type": "RESTART_AGENT"
        })])
        .await;

        let cancel = CancellationToken::new();
        let handle = command_loop(config, Arc::new(DriveCache::new())).spawn(cancel.clone());

        let results = await_results(&state, 1).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(results[0].id, "cmd-2");
        assert!(results[0].payload.is_none());
        assert!(results[0].error.as_deref().unwrap().contains("not implemented"));
    }

    #[tokio::test]
    async fn disk_usage_scans_a_real_tree() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("data.bin"), vec![0u8; 2048]).unwrap();

        let (config, state) = spawn_server(vec![serde_json::json!({
            "id": "cmd-3",
            "type": "DISK_USAGE",
            "payload": {"path": tmp.path().to_string_lossy(), "top_n": 5}
        })])
        .await;

        let cancel = CancellationToken::new();
        let handle = command_loop(config, Arc::new(DriveCache::new())).spawn(cancel.clone());

        let results = await_results(&state, 1).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(results[0].error.is_none(), "error: {:?}", results[0].error);
        let report: spectra_metrics::DiskUsageTopReport =
            serde_json::from_value(results[0].payload.clone().unwrap()).unwrap();
        assert_eq!(report.scanned_files, 1);
        assert_eq!(report.top_files[0].size, 2048);
    }

    #[tokio::test]
    async fn malformed_payload_becomes_error_result() {
        let (config, state) = spawn_server(vec![serde_json::json!({
            "id": "cmd-4",
            "type": "NETWORK_DIAG",
            "payload": {"action": 42}
        })])
        .await;

        let cancel = CancellationToken::new();
        let handle = command_loop(config, Arc::new(DriveCache::new())).spawn(cancel.clone());

        let results = await_results(&state, 1).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(results[0].payload.is_none());
        assert!(results[0].error.as_deref().unwrap().contains("malformed"));
    }

    #[tokio::test]
    async fn unknown_network_action_becomes_error_result() {
        let (config, state) = spawn_server(vec![serde_json::json!({
            "id": "cmd-5",
            "type": "NETWORK_DIAG",
            "payload": {"action": "flood", "target": "somewhere"}
        })])
        .await;

        let cancel = CancellationToken::new();
        let handle = command_loop(config, Arc::new(DriveCache::new())).spawn(cancel.clone());

        let results = await_results(&state, 1).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(results[0].error.as_deref().unwrap().contains("unknown network action"));
    }
}
