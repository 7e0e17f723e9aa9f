//! Host integration: Wi-Fi provisioning, battery and power

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::failure;
use crate::collab::{BatteryMonitor, BatteryStatus, NetworkProvisioner, PowerControl, ProvisionError};

const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

/// Joins Wi-Fi networks with the host's network tooling
pub struct SystemProvisioner {
    /// Where Windows WLAN profiles are written before import
    profile_dir: PathBuf,
}

impl SystemProvisioner {
    pub fn new(profile_dir: PathBuf) -> Self {
        Self { profile_dir }
    }

    fn write_profile(&self, ssid: &str, password: &str) -> Result<PathBuf, ProvisionError> {
        let file_name: String = ssid
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let path = self.profile_dir.join(format!("{file_name}.xml"));
        fs::write(&path, wlan_profile(ssid, password))?;
        Ok(path)
    }
}

impl NetworkProvisioner for SystemProvisioner {
    fn connect(&self, ssid: &str, password: &str) -> Result<(), ProvisionError> {
        info!(ssid, "joining Wi-Fi network");
        match std::env::consts::OS {
            "linux" => run(
                "nmcli",
                &["device", "wifi", "connect", ssid, "password", password],
            ),
            "macos" => run(
                "networksetup",
                &["-setairportnetwork", "en0", ssid, password],
            ),
            "windows" => {
                let profile = self.write_profile(ssid, password)?;
                let filename = format!("filename={}", profile.display());
                let result = run("netsh", &["wlan", "add", "profile", &filename]).and_then(|()| {
                    run("netsh", &["wlan", "connect", &format!("name={ssid}")])
                });
                // The profile holds the password in clear text
                let _ = fs::remove_file(&profile);
                result
            }
            other => Err(ProvisionError::Unsupported(other)),
        }
    }
}

fn run(program: &str, args: &[&str]) -> Result<(), ProvisionError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| ProvisionError::Command {
            program: program.to_string(),
            reason: e.to_string(),
        })?;
    if output.status.success() {
        debug!(program, "command succeeded");
        Ok(())
    } else {
        Err(ProvisionError::Command {
            program: program.to_string(),
            reason: failure(&output),
        })
    }
}

/// WPA2-PSK WLAN profile for `netsh wlan add profile`
fn wlan_profile(ssid: &str, password: &str) -> String {
    let ssid = xml_escape(ssid);
    let password = xml_escape(password);
    format!(
        r#"<?xml version="1.0"?>
<WLANProfile xmlns="http://www.microsoft.com/networking/WLAN/profile/v1">
    <name>{ssid}</name>
    <SSIDConfig>
        <SSID>
            <name>{ssid}</name>
        </SSID>
    </SSIDConfig>
    <connectionType>ESS</connectionType>
    <connectionMode>auto</connectionMode>
    <MSM>
        <security>
            <authEncryption>
                <authentication>WPA2PSK</authentication>
                <encryption>AES</encryption>
                <useOneX>false</useOneX>
            </authEncryption>
            <sharedKey>
                <keyType>passPhrase</keyType>
                <protected>false</protected>
                <keyMaterial>{password}</keyMaterial>
            </sharedKey>
        </security>
    </MSM>
</WLANProfile>
"#
    )
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Battery state from the Linux power-supply class
pub struct SysfsBattery {
    root: PathBuf,
}

impl SysfsBattery {
    pub fn new() -> Self {
        Self::at(POWER_SUPPLY_ROOT)
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_supply(dir: &Path) -> Option<BatteryStatus> {
        let kind = fs::read_to_string(dir.join("type")).ok()?;
        if kind.trim() != "Battery" {
            return None;
        }
        let percent: u8 = fs::read_to_string(dir.join("capacity"))
            .ok()?
            .trim()
            .parse()
            .ok()?;
        let status = fs::read_to_string(dir.join("status")).unwrap_or_default();
        // Plugged in counts as charging, including a full battery
        let charging = matches!(status.trim(), "Charging" | "Full");
        Some(BatteryStatus {
            percent: percent.min(100),
            charging,
        })
    }
}

impl Default for SysfsBattery {
    fn default() -> Self {
        Self::new()
    }
}

impl BatteryMonitor for SysfsBattery {
    fn read(&self) -> Option<BatteryStatus> {
        let mut supplies: Vec<PathBuf> = fs::read_dir(&self.root)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        supplies.sort();
        supplies.iter().find_map(|dir| Self::read_supply(dir))
    }
}

/// Powers the host off, if the configuration allows it
pub struct SystemPower {
    allowed: bool,
}

impl SystemPower {
    pub fn new(allowed: bool) -> Self {
        Self { allowed }
    }
}

impl PowerControl for SystemPower {
    fn shutdown(&self) -> Result<(), String> {
        if !self.allowed {
            info!("OS shutdown disabled, only the daemon will exit");
            return Ok(());
        }

        let (program, args): (&str, &[&str]) = match std::env::consts::OS {
            "linux" | "macos" => ("shutdown", &["now"][..]),
            "windows" => ("shutdown", &["/s", "/t", "1"][..]),
            other => return Err(format!("Automated shutdown not supported on {other}")),
        };

        info!(program, ?args, "requesting OS shutdown");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| format!("failed to run {program}: {e}"))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(failure(&output))
        }
    }
}
