//! Network diagnostics dispatcher.
//!
//! Routes one NETWORK_DIAG request to the matching probe: the ICMP prober,
//! the platform tracer, the socket table, or a plain TCP connect.

use crate::{icmp, Error, Result};
use spectra_metrics::{NetworkDiagRequest, NetworkDiagResult, PingResult};
use std::net::{TcpStream, ToSocketAddrs};
use std::process::Command;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// TCP connect probe timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Dispatch one request on its `action`.
pub fn run_network_diag(
    request: &NetworkDiagRequest,
    cancel: &CancellationToken,
) -> Result<NetworkDiagResult> {
    let mut result = NetworkDiagResult {
        action: request.action.clone(),
        target: request.target.clone(),
        ..Default::default()
    };

    match request.action.as_str() {
        "ping" => {
            result.ping_results = Some(icmp::ping(&request.target, cancel)?);
        }
        "traceroute" => {
            result.raw_output = Some(run_traceroute(&request.target)?);
        }
        "netstat" => {
            result.netstat = Some(spectra_platform::netstat_entries()?);
        }
        "connect" => {
            result.ping_results = Some(vec![tcp_connect(&request.target)]);
        }
        other => {
            return Err(Error::Malformed(format!("unknown network action {:?}", other)));
        }
    }

    Ok(result)
}

/// Invoke the platform tracer with numeric output, a 2-second per-hop
/// timeout, and a single probe per hop.
fn run_traceroute(target: &str) -> Result<String> {
    let output = if cfg!(windows) {
        Command::new("tracert").args(["-d", "-w", "2000", target]).output()?
    } else {
        // ICMP mode matches what the ping probe exercises
        Command::new("traceroute").args(["-n", "-w", "2", "-q", "1", "-I", target]).output()?
    };

    if !output.status.success() && output.stdout.is_empty() {
        return Err(Error::Platform(format!(
            "traceroute failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Plain TCP dial to `host:port`, reported as a single probe result.
fn tcp_connect(target: &str) -> PingResult {
    let started = Instant::now();

    let addr = match target.to_socket_addrs().ok().and_then(|mut addrs| addrs.next()) {
        Some(addr) => addr,
        None => {
            return PingResult {
                seq: 0,
                success: false,
                rtt: Duration::ZERO,
                response: format!("write failed: cannot resolve {:?}", target),
                peer: String::new(),
                code: None,
            };
        }
    };

    match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
        Ok(_) => PingResult {
            seq: 0,
            success: true,
            rtt: started.elapsed(),
            response: "reply".to_string(),
            peer: addr.ip().to_string(),
            code: None,
        },
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => PingResult {
            seq: 0,
            success: false,
            rtt: started.elapsed(),
            response: "timeout".to_string(),
            peer: addr.ip().to_string(),
            code: None,
        },
        Err(e) => PingResult {
            seq: 0,
            success: false,
            rtt: started.elapsed(),
            response: format!("write failed: {}", e),
            peer: addr.ip().to_string(),
            code: None,
        },
    }
}
