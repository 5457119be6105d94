//! Socket table parsing for Linux.
//!
//! Reads /proc/net/tcp, /proc/net/tcp6, /proc/net/udp, /proc/net/udp6.
//! Kernel format: addresses are hex-encoded and little-endian (IPv6 as four
//! 32-bit words, each little-endian), ports are big-endian hex, states are a
//! hex code.

use crate::{NetstatEntry, Result};
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Map a kernel TCP state code to its name.
pub fn tcp_state_name(state: u8) -> &'static str {
    match state {
        1 => "ESTABLISHED",
        2 => "SYN_SENT",
        3 => "SYN_RECV",
        4 => "FIN_WAIT1",
        5 => "FIN_WAIT2",
        6 => "TIME_WAIT",
        7 => "CLOSE",
        8 => "CLOSE_WAIT",
        9 => "LAST_ACK",
        10 => "LISTEN",
        11 => "CLOSING",
        _ => "UNKNOWN",
    }
}

/// Parse an IPv4 address from kernel hex format (8 chars, little-endian).
pub fn parse_ipv4_addr(hex: &str) -> Option<Ipv4Addr> {
    if hex.len() != 8 {
        return None;
    }
    let mut bytes = [0u8; 4];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    // Little-endian on the wire, reverse for display order
    Some(Ipv4Addr::new(bytes[3], bytes[2], bytes[1], bytes[0]))
}

/// Parse an IPv6 address from kernel hex format (32 chars, four 32-bit
/// little-endian words).
pub fn parse_ipv6_addr(hex: &str) -> Option<Ipv6Addr> {
    if hex.len() != 32 {
        return None;
    }
    let mut bytes = [0u8; 16];
    for word in 0..4 {
        for j in 0..4 {
            let pos = word * 8 + j * 2;
            let value = u8::from_str_radix(&hex[pos..pos + 2], 16).ok()?;
            // Bytes within each word are reversed
            bytes[word * 4 + (3 - j)] = value;
        }
    }
    Some(Ipv6Addr::from(bytes))
}

/// Parse an "ADDR:PORT" hex field into display address and host-order port.
pub fn parse_addr_port(field: &str, ipv6: bool) -> Option<(String, u16)> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    let addr = if ipv6 {
        parse_ipv6_addr(addr_hex)?.to_string()
    } else {
        parse_ipv4_addr(addr_hex)?.to_string()
    };
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    Some((addr, port))
}

/// Parse one /proc/net table into netstat rows.
///
/// `proto` names the table ("tcp", "udp6", ...); UDP rows get an empty state.
pub fn parse_socket_table(content: &str, proto: &str) -> Vec<NetstatEntry> {
    let ipv6 = proto.ends_with('6');
    let udp = proto.starts_with("udp");
    let mut entries = Vec::new();

    for line in content.lines().skip(1) {
        // Format: sl local_address rem_address st tx_queue:rx_queue tr:tm->when retrnsmt uid ...
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 8 {
            continue;
        }

        let Some((local_addr, local_port)) = parse_addr_port(parts[1], ipv6) else { continue };
        let Some((remote_addr, remote_port)) = parse_addr_port(parts[2], ipv6) else { continue };

        let state = if udp {
            String::new()
        } else {
            let code = u8::from_str_radix(parts[3], 16).unwrap_or(0);
            tcp_state_name(code).to_string()
        };

        let user = parts.get(7).map(|s| s.to_string());

        entries.push(NetstatEntry {
            proto: proto.to_string(),
            local_addr,
            local_port,
            remote_addr,
            remote_port,
            state,
            user,
            pid: None,
        });
    }

    entries
}

/// Read the full socket table from /proc/net.
pub fn netstat_entries() -> Result<Vec<NetstatEntry>> {
    let mut entries = Vec::new();

    for proto in ["tcp", "udp", "tcp6", "udp6"] {
        match fs::read_to_string(format!("/proc/net/{}", proto)) {
            Ok(content) => entries.extend(parse_socket_table(&content, proto)),
            Err(e) => log::debug!("skipping /proc/net/{}: {}", proto, e),
        }
    }

    Ok(entries)
}
