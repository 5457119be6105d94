//! Shared HTTP and compression plumbing.
//!
//! One reqwest client serves the uploader, the command loop, and
//! registration. Gzip encoding goes through a single process-wide staging
//! buffer under a mutex; the compressed bytes are copied out to a stable
//! buffer before the lock is released, because the HTTP layer reads the body
//! asynchronously while a later flush may already be encoding.

use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::io::Write;
use std::time::Duration;

/// Identifies the agent on every request.
pub const USER_AGENT: &str = "Spectra-Agent/1.0";

/// Whole-request timeout for the shared client.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(45);

/// Build the shared HTTP client.
pub fn build_client() -> reqwest::Result<Client> {
    Client::builder().timeout(HTTP_TIMEOUT).user_agent(USER_AGENT).build()
}

/// Process-wide gzip staging buffer. Single-writer discipline: only one
/// encoder runs at a time.
#[derive(Default)]
pub struct GzipScratch {
    staging: Mutex<Vec<u8>>,
}

impl GzipScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compress `data`, reusing the staging buffer across calls.
    pub fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut guard = self.staging.lock();

        let mut staging = std::mem::take(&mut *guard);
        staging.clear();

        let mut encoder = GzEncoder::new(staging, Compression::default());
        encoder.write_all(data)?;
        let staging = encoder.finish()?;

        // Copy out before the staging buffer goes back for reuse
        let compressed = staging.clone();
        *guard = staging;

        Ok(compressed)
    }
}

/// POST a gzip-compressed JSON body. Returns the response status; callers
/// decide whether a rejection matters.
pub async fn post_gzip(client: &Client, url: &str, body: Vec<u8>) -> reqwest::Result<StatusCode> {
    let response = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .header(CONTENT_ENCODING, "gzip")
        .body(body)
        .send()
        .await?;
    Ok(response.status())
}
