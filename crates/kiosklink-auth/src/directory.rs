//! Owner-scoped device queries and renames

use crate::account::AccountId;
use crate::device::{normalize_name, DeviceInfo};
use crate::error::{AuthError, AuthResult};
use crate::storage::CredentialStore;
use chrono::Duration;
use kiosklink_core::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Request to rename a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

/// Devices owned by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceList {
    pub devices: Vec<DeviceInfo>,
}

/// Read and rename operations scoped to a device's owner
pub struct OwnershipDirectory {
    storage: Arc<CredentialStore>,
    clock: Arc<dyn Clock>,
    online_threshold: Duration,
}

impl OwnershipDirectory {
    pub fn new(storage: Arc<CredentialStore>, clock: Arc<dyn Clock>, online_threshold: Duration) -> Self {
        Self {
            storage,
            clock,
            online_threshold,
        }
    }

    /// List devices owned by `account`, ordered by name (unnamed first) then hardware ID
    pub async fn list(&self, account: &AccountId) -> Vec<DeviceInfo> {
        let now = self.clock.now();
        let mut devices: Vec<DeviceInfo> = self
            .storage
            .read(|data| {
                data.devices
                    .values()
                    .filter(|d| d.is_owned_by(account))
                    .map(|d| DeviceInfo::from_device(d, now, self.online_threshold))
                    .collect()
            })
            .await;
        devices.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.hardware_id.cmp(&b.hardware_id))
        });
        devices
    }

    /// Fetch a single device owned by `account`
    pub async fn get(&self, account: &AccountId, device_id: &str) -> AuthResult<DeviceInfo> {
        let now = self.clock.now();
        self.storage
            .read(|data| {
                let device = data
                    .device(device_id)
                    .ok_or_else(|| AuthError::not_found("device"))?;
                if !device.is_owned_by(account) {
                    return Err(AuthError::Forbidden);
                }
                Ok(DeviceInfo::from_device(device, now, self.online_threshold))
            })
            .await
    }

    /// Rename a device owned by `account`
    pub async fn rename(&self, account: &AccountId, device_id: &str, name: &str) -> AuthResult<()> {
        let name = normalize_name(Some(name))?
            .ok_or_else(|| AuthError::invalid_input("name is required"))?;

        self.storage
            .update_device(device_id, |device| {
                if !device.is_owned_by(account) {
                    return Err(AuthError::Forbidden);
                }
                device.name = Some(name);
                Ok(())
            })
            .await?
            .ok_or_else(|| AuthError::not_found("device"))?;

        info!("Device {} renamed by account {}", device_id, account);
        Ok(())
    }
}
