//! Temperature sensors for Linux via /sys/class/hwmon
//!
//! Path structure:
//! - /sys/class/hwmon/hwmon*/name - Device name
//! - /sys/class/hwmon/hwmon*/temp*_input - Temperature in millidegrees
//! - /sys/class/hwmon/hwmon*/temp*_label - Sensor label (optional)
//! - /sys/class/hwmon/hwmon*/temp*_max - Max safe temp (optional)
//! - /sys/class/hwmon/hwmon*/temp*_crit - Critical temp (optional)

use crate::{Error, Result};
use spectra_metrics::TemperatureMetric;
use std::fs;
use std::path::Path;

/// Read every temperature input under /sys/class/hwmon.
pub fn read_temperatures() -> Result<Vec<TemperatureMetric>> {
    let hwmon_path = Path::new("/sys/class/hwmon");
    if !hwmon_path.exists() {
        return Err(Error::NotSupported);
    }

    let mut readings = Vec::new();

    let entries = fs::read_dir(hwmon_path)?;
    for entry in entries.flatten() {
        let hwmon_dir = entry.path();
        if !hwmon_dir.is_dir() {
            continue;
        }

        let sensor = fs::read_to_string(hwmon_dir.join("name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let Ok(files) = fs::read_dir(&hwmon_dir) else { continue };
        for file in files.flatten() {
            let file_name = file.file_name().to_string_lossy().to_string();
            if !file_name.starts_with("temp") || !file_name.ends_with("_input") {
                continue;
            }

            let prefix = file_name.trim_end_matches("_input");

            // Inputs are in millidegrees Celsius
            let millidegrees: i64 = fs::read_to_string(file.path())
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0);

            let label = fs::read_to_string(hwmon_dir.join(format!("{}_label", prefix)))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();

            let max_celsius = fs::read_to_string(hwmon_dir.join(format!("{}_max", prefix)))
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .map(|t| t as f64 / 1000.0);

            let critical_celsius = fs::read_to_string(hwmon_dir.join(format!("{}_crit", prefix)))
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .map(|t| t as f64 / 1000.0);

            readings.push(TemperatureMetric {
                sensor: sensor.clone(),
                label,
                celsius: millidegrees as f64 / 1000.0,
                max_celsius,
                critical_celsius,
            });
        }
    }

    Ok(readings)
}

/// Whether any hwmon device is present.
pub fn is_supported() -> bool {
    Path::new("/sys/class/hwmon").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_does_not_panic() {
        // hwmon may be absent in containers; only exercise the walk
        match read_temperatures() {
            Ok(zones) => {
                for zone in &zones {
                    assert!(zone.celsius > -300.0);
                }
            }
            Err(Error::NotSupported) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}
