//! Hardware ID discovery

use std::path::Path;
use tracing::debug;

use crate::error::{AgentError, AgentResult};

/// Environment override for the hardware ID
pub const HARDWARE_ID_ENV: &str = "KIOSKLINK_HARDWARE_ID";

const NULL_MAC: &str = "00:00:00:00:00:00";

/// Hardware ID from the environment or the first usable network interface
pub fn discover_hardware_id() -> AgentResult<String> {
    if let Ok(value) = std::env::var(HARDWARE_ID_ENV) {
        let value = value.trim();
        if !value.is_empty() {
            return Ok(value.to_string());
        }
    }
    mac_from_sysfs(Path::new("/sys/class/net")).ok_or(AgentError::NoHardwareId)
}

/// First non-loopback, non-zero MAC under a sysfs net directory
///
/// `wlan0` wins when present; other interfaces are tried in name order.
pub fn mac_from_sysfs(net_dir: &Path) -> Option<String> {
    let mut names: Vec<String> = std::fs::read_dir(net_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "lo")
        .collect();
    names.sort();
    if let Some(pos) = names.iter().position(|n| n == "wlan0") {
        let wlan = names.remove(pos);
        names.insert(0, wlan);
    }

    names.into_iter().find_map(|name| {
        let mac = std::fs::read_to_string(net_dir.join(&name).join("address")).ok()?;
        let mac = mac.trim();
        if mac.is_empty() || mac == NULL_MAC {
            None
        } else {
            debug!("Using MAC of {} as hardware ID", name);
            Some(mac.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn iface(root: &Path, name: &str, mac: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("address"), format!("{}\n", mac)).unwrap();
    }

    #[test]
    fn test_prefers_wlan0() {
        let dir = tempdir().unwrap();
        iface(dir.path(), "eth0", "aa:aa:aa:aa:aa:aa");
        iface(dir.path(), "wlan0", "bb:bb:bb:bb:bb:bb");
        assert_eq!(mac_from_sysfs(dir.path()).as_deref(), Some("bb:bb:bb:bb:bb:bb"));
    }

    #[test]
    fn test_skips_loopback_and_null() {
        let dir = tempdir().unwrap();
        iface(dir.path(), "lo", "00:00:00:00:00:00");
        iface(dir.path(), "dummy0", "00:00:00:00:00:00");
        iface(dir.path(), "eth1", "cc:cc:cc:cc:cc:cc");
        assert_eq!(mac_from_sysfs(dir.path()).as_deref(), Some("cc:cc:cc:cc:cc:cc"));
    }

    #[test]
    fn test_nothing_usable() {
        let dir = tempdir().unwrap();
        iface(dir.path(), "lo", "00:00:00:00:00:00");
        assert!(mac_from_sysfs(dir.path()).is_none());
        assert!(mac_from_sysfs(&dir.path().join("missing")).is_none());
    }
}
