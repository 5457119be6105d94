//! Nightly inventory sources: installed packages and systemd units.

use crate::Result;
use spectra_metrics::{ApplicationInfo, ServiceMetric};
use std::process::Command;

/// List systemd service units via `systemctl list-units`.
pub fn read_services() -> Result<Vec<ServiceMetric>> {
    let output = Command::new("systemctl")
        .args(["list-units", "--type=service", "--all", "--no-legend", "--plain", "--no-pager"])
        .output()?;

    if !output.status.success() {
        return Err(crate::Error::Platform(format!("systemctl exited with {}", output.status)));
    }

    Ok(parse_services(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `systemctl list-units --plain --no-legend` columns:
/// `UNIT LOAD ACTIVE SUB DESCRIPTION...`
pub fn parse_services(content: &str) -> Vec<ServiceMetric> {
    let mut services = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }

        services.push(ServiceMetric {
            name: parts[0].to_string(),
            loaded: parts[1] == "loaded",
            active_state: parts[2].to_string(),
            sub_state: parts[3].to_string(),
        });
    }

    services
}

/// List installed packages, preferring dpkg and falling back to rpm.
pub fn read_applications() -> Result<Vec<ApplicationInfo>> {
    if let Ok(output) =
        Command::new("dpkg-query").args(["-W", "-f", "${Package}\\t${Version}\\n"]).output()
        && output.status.success()
    {
        return Ok(parse_package_lines(&String::from_utf8_lossy(&output.stdout)));
    }

    let output = Command::new("rpm").args(["-qa", "--qf", "%{NAME}\\t%{VERSION}\\n"]).output()?;
    if !output.status.success() {
        return Err(crate::Error::Platform("no package manager available".into()));
    }

    Ok(parse_package_lines(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse tab-separated `name\tversion` lines.
pub fn parse_package_lines(content: &str) -> Vec<ApplicationInfo> {
    content
        .lines()
        .filter_map(|line| {
            let (name, version) = line.split_once('\t')?;
            if name.is_empty() {
                return None;
            }
            Some(ApplicationInfo { name: name.to_string(), version: version.trim().to_string() })
        })
        .collect()
}
