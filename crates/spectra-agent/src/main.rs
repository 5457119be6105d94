//! spectra-agent - Host monitoring agent daemon.
//!
//! Samples OS metrics on independent cadences, ships them to the server as
//! compressed batches, and answers operator commands pulled over HTTP.
//! SIGINT/SIGTERM trigger a clean shutdown.

mod commands;
mod config;
mod mounts;
mod registration;
mod scheduler;
mod supervisor;
mod transport;
mod uploader;

use config::Config;
use supervisor::Agent;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Config::from_env();
    log::info!(
        "spectra-agent {} on {} -> {}",
        supervisor::AGENT_VERSION,
        config.hostname,
        config.base_url
    );

    let mut agent = Agent::new(config)?;
    agent.start().await;

    wait_for_shutdown_signal().await?;
    log::info!("shutdown signal received");

    agent.shutdown().await;
    Ok(())
}

/// Block until SIGINT or SIGTERM (Ctrl-C on non-Unix).
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = term.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
