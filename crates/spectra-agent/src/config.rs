//! Agent configuration, captured once at startup.

use std::time::Duration;

/// Default server root when `SPECTRA_SERVER` is unset.
const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

/// Immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server root, no trailing slash.
    pub base_url: String,
    /// Identity sent with every request.
    pub hostname: String,
    /// Metrics ingestion path.
    pub metrics_path: String,
    /// Command fetch path.
    pub command_path: String,
    /// Command poll period.
    pub poll_interval: Duration,
}

impl Config {
    /// Capture configuration from the process environment.
    ///
    /// `SPECTRA_SERVER` sets the server root; `HOSTNAME` overrides the OS
    /// hostname.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup (injectable for tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = lookup("SPECTRA_SERVER")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string())
            .trim_end_matches('/')
            .to_string();

        let hostname = lookup("HOSTNAME")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(os_hostname);

        Self {
            base_url,
            hostname,
            metrics_path: "/api/v1/metrics".to_string(),
            command_path: "/api/v1/agent/command".to_string(),
            poll_interval: Duration::from_secs(5),
        }
    }

    /// Metrics ingestion endpoint.
    pub fn metrics_url(&self) -> String {
        format!("{}{}?hostname={}", self.base_url, self.metrics_path, self.hostname)
    }

    /// Command fetch endpoint.
    pub fn command_url(&self) -> String {
        format!("{}{}?hostname={}", self.base_url, self.command_path, self.hostname)
    }

    /// Command result upload endpoint.
    pub fn command_result_url(&self) -> String {
        format!("{}/api/v1/agent/command_result?hostname={}", self.base_url, self.hostname)
    }

    /// Registration endpoint.
    pub fn register_url(&self) -> String {
        format!("{}/api/v1/agent/register", self.base_url)
    }
}

/// The operating system's own idea of this host's name.
fn os_hostname() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }
    #[cfg(not(unix))]
    {
        std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.metrics_path, "/api/v1/metrics");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert!(!config.hostname.is_empty());
    }

    #[test]
    fn env_overrides_and_url_shapes() {
        let config = Config::from_lookup(|key| match key {
            "SPECTRA_SERVER" => Some("https://monitor.example.com/".to_string()),
            "HOSTNAME" => Some("web-01".to_string()),
            _ => None,
        });

        assert_eq!(config.base_url, "https://monitor.example.com");
        assert_eq!(config.hostname, "web-01");
        assert_eq!(
            config.metrics_url(),
            "https://monitor.example.com/api/v1/metrics?hostname=web-01"
        );
        assert_eq!(
            config.command_url(),
            "https://monitor.example.com/api/v1/agent/command?hostname=web-01"
        );
        assert_eq!(
            config.command_result_url(),
            "https://monitor.example.com/api/v1/agent/command_result?hostname=web-01"
        );
        assert_eq!(config.register_url(), "https://monitor.example.com/api/v1/agent/register");
    }

    #[test]
    fn empty_env_values_fall_back() {
        let config = Config::from_lookup(|key| match key {
            "SPECTRA_SERVER" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
    }
}
