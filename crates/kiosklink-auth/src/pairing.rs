//! Device pairing with short-lived claim codes
//!
//! Implements the ownership handshake:
//! 1. An authenticated account opens a pairing window on a device (by device
//!    ID or hardware ID), receiving a 6-digit code valid for a bounded TTL
//! 2. The code reaches the physical device out of band
//! 3. The device claims the window, presenting its bearer secret and the code
//! 4. On success the initiator becomes the owner and the window is consumed
//!
//! Possession of the secret binds the claim to the registered unit;
//! possession of the code binds it to the initiating account.

use crate::account::AccountId;
use crate::device::{Device, HardwareId, PairingWindow};
use crate::error::{AuthError, AuthResult};
use crate::secret::generate_pairing_code;
use crate::storage::CredentialStore;
use chrono::{DateTime, Duration, Utc};
use kiosklink_core::{Clock, PairingTtl};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest pairing code a caller may choose
pub const MAX_PAIRING_CODE_LEN: usize = 32;

/// Request to open a pairing window on a known device ID
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenPairingRequest {
    /// Caller-chosen code; generated when absent or blank
    #[serde(default)]
    pub pairing_code: Option<String>,
    /// Requested lifetime, clamped server-side
    #[serde(default)]
    pub ttl_sec: Option<i64>,
}

/// Request to open a pairing window by hardware ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairByHardwareIdRequest {
    #[serde(alias = "mac")]
    pub hardware_id: String,
    #[serde(default)]
    pub pairing_code: Option<String>,
    #[serde(default)]
    pub ttl_sec: Option<i64>,
}

/// An opened pairing window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingResponse {
    pub pairing_code: String,
    /// Unix timestamp after which the code is refused
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires: DateTime<Utc>,
}

/// Device-side request to consume a pairing window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    #[serde(alias = "device_token")]
    pub device_secret: String,
    pub pairing_code: String,
}

/// How the target device of a pairing window is addressed
#[derive(Debug, Clone)]
enum PairingTarget {
    DeviceId(String),
    HardwareId(HardwareId),
}

/// Opens and consumes pairing windows
pub struct PairingCoordinator {
    storage: Arc<CredentialStore>,
    clock: Arc<dyn Clock>,
    ttl: PairingTtl,
}

impl PairingCoordinator {
    pub fn new(storage: Arc<CredentialStore>, clock: Arc<dyn Clock>, ttl: PairingTtl) -> Self {
        Self {
            storage,
            clock,
            ttl,
        }
    }

    /// Open a pairing window on a device addressed by its device ID
    pub async fn open_by_device_id(
        &self,
        initiator: &AccountId,
        device_id: &str,
        pairing_code: Option<&str>,
        ttl_sec: Option<i64>,
    ) -> AuthResult<PairingResponse> {
        self.open(
            initiator,
            PairingTarget::DeviceId(device_id.to_string()),
            pairing_code,
            ttl_sec,
        )
        .await
    }

    /// Open a pairing window on a device addressed by its hardware ID
    pub async fn open_by_hardware_id(
        &self,
        initiator: &AccountId,
        hardware_id: &str,
        pairing_code: Option<&str>,
        ttl_sec: Option<i64>,
    ) -> AuthResult<PairingResponse> {
        let hardware_id = HardwareId::parse(hardware_id)?;
        self.open(
            initiator,
            PairingTarget::HardwareId(hardware_id),
            pairing_code,
            ttl_sec,
        )
        .await
    }

    async fn open(
        &self,
        initiator: &AccountId,
        target: PairingTarget,
        pairing_code: Option<&str>,
        ttl_sec: Option<i64>,
    ) -> AuthResult<PairingResponse> {
        let code = resolve_code(pairing_code)?;
        let ttl = self.ttl.clamp(ttl_sec);
        let expires = self.clock.now() + Duration::seconds(ttl);

        let window = PairingWindow {
            code: code.clone(),
            initiator: initiator.clone(),
            expires_at: expires,
        };

        let install = |device: &mut Device| {
            // replaces, and thereby revokes, any earlier window
            device.pairing = Some(window);
            Ok::<_, AuthError>(device.device_id.clone())
        };
        let device_id = match &target {
            PairingTarget::DeviceId(id) => self.storage.update_device(id, install).await?,
            PairingTarget::HardwareId(hw) => {
                self.storage.update_device_by_hardware_id(hw, install).await?
            }
        }
        .ok_or_else(|| AuthError::not_found("device"))?;

        info!(
            "Opened pairing window on device {} for account {} ({}s)",
            device_id, initiator, ttl
        );

        Ok(PairingResponse {
            pairing_code: code,
            expires,
        })
    }

    /// Consume a pairing window, making its initiator the device owner
    ///
    /// Lookup, secret check, window check and the ownership write happen in
    /// one transaction, so a window can be claimed at most once.
    pub async fn claim(
        &self,
        device_id: &str,
        device_secret: &str,
        pairing_code: &str,
    ) -> AuthResult<AccountId> {
        let device_secret = device_secret.trim();
        let pairing_code = pairing_code.trim();
        if device_secret.is_empty() || pairing_code.is_empty() {
            return Err(AuthError::invalid_input(
                "device_secret and pairing_code are required",
            ));
        }
        let now = self.clock.now();

        let result = self
            .storage
            .update_device(device_id, |device| {
                if !device.verify_secret(device_secret) {
                    return Err(AuthError::Unauthorized);
                }

                let owner = match &device.pairing {
                    Some(window) if window.accepts(pairing_code, now) => window.initiator.clone(),
                    _ => return Err(AuthError::PairingInvalid),
                };

                device.owner = Some(owner.clone());
                device.pairing = None;
                device.touch(now);
                Ok(owner)
            })
            .await
            .and_then(|claimed| claimed.ok_or_else(|| AuthError::not_found("device")));

        match &result {
            Ok(owner) => info!("Device {} claimed by account {}", device_id, owner),
            Err(AuthError::Unauthorized) => {
                warn!("Claim rejected for device {}: bad device secret", device_id)
            }
            Err(AuthError::PairingInvalid) => {
                warn!("Claim rejected for device {}: pairing invalid", device_id)
            }
            Err(e) => debug!("Claim failed for device {}: {}", device_id, e),
        }
        result
    }

    /// Clear pairing windows that can no longer be claimed
    ///
    /// Storage hygiene only; `claim` checks expiry on its own.
    pub async fn purge_expired(&self) -> AuthResult<usize> {
        let now = self.clock.now();
        let purged = self
            .storage
            .sweep_devices(|device| clear_expired_window(device, now))
            .await?;
        if purged > 0 {
            debug!("Purged {} expired pairing windows", purged);
        }
        Ok(purged)
    }
}

fn clear_expired_window(device: &mut Device, now: DateTime<Utc>) -> bool {
    if matches!(&device.pairing, Some(window) if !window.is_open_at(now)) {
        device.pairing = None;
        return true;
    }
    false
}

/// Use the caller's code if given, otherwise generate one
fn resolve_code(requested: Option<&str>) -> AuthResult<String> {
    match requested.map(str::trim) {
        None | Some("") => Ok(generate_pairing_code()),
        Some(code) if code.chars().count() > MAX_PAIRING_CODE_LEN => Err(
            AuthError::invalid_input(format!(
                "pairing_code longer than {} characters",
                MAX_PAIRING_CODE_LEN
            )),
        ),
        Some(code) => Ok(code.to_string()),
    }
}
