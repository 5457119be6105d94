//! Wireless link state for Linux.
//!
//! Link quality and signal levels come from /proc/net/wireless; the
//! associated SSID comes from `iwgetid -r` when the tool is present.

use crate::Result;
use spectra_metrics::WifiMetric;
use std::fs;
use std::process::Command;

/// One row of /proc/net/wireless.
#[derive(Debug, Clone, Default)]
pub struct WirelessLink {
    pub interface: String,
    pub link_quality: f64,
    pub signal_dbm: i32,
    pub noise_dbm: i32,
}

/// Parse /proc/net/wireless content (two header lines skipped).
///
/// Row shape: `wlan0: 0000   54.  -56.  -256        0 ...` - the quality
/// columns carry a trailing dot.
pub fn parse_wireless(content: &str) -> Vec<WirelessLink> {
    let mut links = Vec::new();

    for line in content.lines().skip(2) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }

        let interface = parts[0].trim_end_matches(':').to_string();
        let quality: f64 = parts[2].trim_end_matches('.').parse().unwrap_or(0.0);
        let signal: i32 = parts[3].trim_end_matches('.').parse().unwrap_or(0);
        let noise: i32 = parts[4].trim_end_matches('.').parse().unwrap_or(0);

        links.push(WirelessLink {
            interface,
            // Quality is reported out of 70 by most drivers
            link_quality: (quality / 70.0 * 100.0).min(100.0),
            signal_dbm: signal,
            noise_dbm: noise,
        });
    }

    links
}

/// The SSID an interface is associated with, when `iwgetid` can tell.
fn read_ssid(interface: &str) -> String {
    let output = match Command::new("iwgetid").arg(interface).arg("-r").output() {
        Ok(o) if o.status.success() => o.stdout,
        _ => return String::new(),
    };
    String::from_utf8_lossy(&output).trim().to_string()
}

/// Read wireless metrics for every wireless interface.
///
/// Hosts without wireless hardware have no /proc/net/wireless rows; that
/// yields an empty list, not an error.
pub fn read_wifi() -> Result<Vec<WifiMetric>> {
    let content = match fs::read_to_string("/proc/net/wireless") {
        Ok(c) => c,
        Err(_) => return Ok(Vec::new()),
    };

    Ok(parse_wireless(&content)
        .into_iter()
        .map(|link| WifiMetric {
            ssid: read_ssid(&link.interface),
            interface: link.interface,
            signal_dbm: link.signal_dbm,
            link_quality: link.link_quality,
            noise_dbm: link.noise_dbm,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wireless_row() {
        let content = "\
Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE
 face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22
 wlan0: 0000   54.  -56.  -256        0      0      0      0      0        0
";
        let links = parse_wireless(content);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].interface, "wlan0");
        assert_eq!(links[0].signal_dbm, -56);
        assert_eq!(links[0].noise_dbm, -256);
        assert!((links[0].link_quality - 77.14).abs() < 0.1);
    }

    #[test]
    fn no_wireless_is_empty_not_error() {
        let links = parse_wireless("header\nheader\n");
        assert!(links.is_empty());
    }
}
