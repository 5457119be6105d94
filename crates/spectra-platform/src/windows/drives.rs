//! Physical drive enumeration for Windows via CIM.
//!
//! Drives are keyed by disk index with their partition drive letters joined
//! into the mountpoint field. USB and 1394 buses and virtual drives are
//! excluded, matching the drive cache's fixed-disk focus.

use crate::{MountInfo, Result};
use std::process::Command;

fn powershell(script: &str) -> Result<String> {
    let output = Command::new("powershell").args(["-NoProfile", "-Command", script]).output()?;
    if !output.status.success() {
        return Err(crate::Error::Platform(format!("powershell exited with {}", output.status)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Enumerate fixed physical drives with their drive letters.
pub fn list_physical_drives() -> Result<Vec<MountInfo>> {
    let disks = powershell(
        "Get-CimInstance Win32_DiskDrive | \
         Select-Object Index,Model,InterfaceType,MediaType | ConvertTo-Json",
    )?;
    let letters = powershell(
        "Get-Partition | Where-Object DriveLetter | \
         Select-Object DiskNumber,DriveLetter | ConvertTo-Json",
    )?;

    Ok(build_mounts(&disks, &letters))
}

/// Join the disk list with the partition letter map.
pub fn build_mounts(disks_json: &str, letters_json: &str) -> Vec<MountInfo> {
    let disks = parse_json_list(disks_json);
    let letters = parse_json_list(letters_json);

    disks
        .into_iter()
        .filter_map(|disk| {
            let index = disk.get("Index")?.as_u64()?;

            let interface =
                disk.get("InterfaceType").and_then(|v| v.as_str()).unwrap_or_default();
            let media = disk.get("MediaType").and_then(|v| v.as_str()).unwrap_or_default();
            if interface == "USB" || interface == "1394" || media.contains("Removable") {
                return None;
            }

            let drive_letters: Vec<String> = letters
                .iter()
                .filter(|p| p.get("DiskNumber").and_then(|v| v.as_u64()) == Some(index))
                .filter_map(|p| p.get("DriveLetter").and_then(|v| v.as_str()))
                .map(|l| format!("{}:\\", l))
                .collect();

            Some(MountInfo {
                device: format!("PhysicalDrive{}", index),
                mountpoint: drive_letters.join(","),
                fstype: "fixed".to_string(),
            })
        })
        .collect()
}

/// ConvertTo-Json emits a bare object for single results.
fn parse_json_list(content: &str) -> Vec<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(content.trim()) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(object @ serde_json::Value::Object(_)) => vec![object],
        _ => Vec::new(),
    }
}

/// OS version string for registration.
pub fn os_version() -> Result<String> {
    Ok(powershell("[System.Environment]::OSVersion.Version.ToString()")?.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_mounts_and_excludes_usb() {
        let disks = r#"[
            {"Index":0,"Model":"Samsung SSD","InterfaceType":"SCSI","MediaType":"Fixed hard disk media"},
            {"Index":1,"Model":"Flash","InterfaceType":"USB","MediaType":"Removable Media"}
        ]"#;
        let letters = r#"[
            {"DiskNumber":0,"DriveLetter":"C"},
            {"DiskNumber":0,"DriveLetter":"D"},
            {"DiskNumber":1,"DriveLetter":"E"}
        ]"#;

        let mounts = build_mounts(disks, letters);
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].device, "PhysicalDrive0");
        assert_eq!(mounts[0].mountpoint, "C:\\,D:\\");
    }
}
