//! Socket table parsing for Windows via `netstat -ano`.

use crate::{NetstatEntry, Result};
use std::process::Command;

/// Read the full socket table.
pub fn netstat_entries() -> Result<Vec<NetstatEntry>> {
    let output = Command::new("netstat").arg("-ano").output()?;

    if !output.status.success() {
        return Err(crate::Error::Platform(format!("netstat exited with {}", output.status)));
    }

    Ok(parse_netstat(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `netstat -ano` output.
///
/// Column shapes:
/// `TCP    10.0.0.5:49701    93.184.216.34:443    ESTABLISHED    4321`
/// `TCP    [::]:135          [::]:0               LISTENING      1044`
/// `UDP    0.0.0.0:5353      *:*                                 2192`
pub fn parse_netstat(content: &str) -> Vec<NetstatEntry> {
    let mut entries = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }

        let udp = match parts[0] {
            "TCP" => false,
            "UDP" => true,
            _ => continue,
        };

        let Some((local_addr, local_port, v6)) = split_addr_port(parts[1]) else { continue };
        let (remote_addr, remote_port, _) =
            split_addr_port(parts[2]).unwrap_or((String::new(), 0, false));

        let (state, pid_field) = if udp {
            // UDP rows have no state column
            (String::new(), parts[3])
        } else {
            if parts.len() < 5 {
                continue;
            }
            (normalize_state(parts[3]).to_string(), parts[4])
        };

        let pid = pid_field.parse::<u32>().ok();

        let proto = match (udp, v6) {
            (false, false) => "tcp",
            (false, true) => "tcp6",
            (true, false) => "udp",
            (true, true) => "udp6",
        };

        entries.push(NetstatEntry {
            proto: proto.to_string(),
            local_addr,
            local_port,
            remote_addr,
            remote_port,
            state,
            user: None,
            pid,
        });
    }

    entries
}

/// Split `addr:port`, `[v6addr]:port`, or `*:*` into its parts.
fn split_addr_port(field: &str) -> Option<(String, u16, bool)> {
    if field == "*:*" {
        return Some((String::new(), 0, false));
    }

    if let Some(rest) = field.strip_prefix('[') {
        let (addr, port) = rest.split_once("]:")?;
        return Some((addr.to_string(), port.parse().unwrap_or(0), true));
    }

    let (addr, port) = field.rsplit_once(':')?;
    Some((addr.to_string(), port.parse().unwrap_or(0), false))
}

/// Map netstat state spellings onto the shared TCP state names.
fn normalize_state(state: &str) -> &'static str {
    match state {
        "ESTABLISHED" => "ESTABLISHED",
        "SYN_SENT" => "SYN_SENT",
        "SYN_RECEIVED" | "SYN_RECV" => "SYN_RECV",
        "FIN_WAIT_1" | "FIN_WAIT1" => "FIN_WAIT1",
        "FIN_WAIT_2" | "FIN_WAIT2" => "FIN_WAIT2",
        "TIME_WAIT" => "TIME_WAIT",
        "CLOSED" | "CLOSE" => "CLOSE",
        "CLOSE_WAIT" => "CLOSE_WAIT",
        "LAST_ACK" => "LAST_ACK",
        "LISTENING" | "LISTEN" => "LISTEN",
        "CLOSING" => "CLOSING",
        _ => "UNKNOWN",
    }
}
