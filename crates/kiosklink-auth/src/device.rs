//! Device identity and pairing window
//!
//! A [`Device`] row carries the identity issued at registration, the hash of
//! its bearer secret, its owner and at most one outstanding pairing window.

use crate::account::AccountId;
use crate::error::{AuthError, AuthResult};
use crate::secret;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted hardware identifier
pub const MAX_HARDWARE_ID_LEN: usize = 64;

/// Longest accepted device name
pub const MAX_NAME_LEN: usize = 255;

/// Server-issued, opaque device identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Generate a new random device ID (not yet checked for collisions)
    pub fn generate() -> Self {
        Self(secret::generate_device_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized physical identifier of a unit (typically its MAC address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareId(String);

impl HardwareId {
    /// Trim, lowercase and validate a caller-supplied hardware identifier
    pub fn parse(raw: &str) -> AuthResult<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(AuthError::invalid_input("hardware_id is required"));
        }
        if normalized.chars().count() > MAX_HARDWARE_ID_LEN {
            return Err(AuthError::invalid_input(format!(
                "hardware_id longer than {} characters",
                MAX_HARDWARE_ID_LEN
            )));
        }
        if normalized
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(AuthError::invalid_input(
                "hardware_id contains whitespace or control characters",
            ));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HardwareId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stored lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Registered (or re-registered) and not yet claimed or heard from
    #[default]
    Provisioning,
    /// Claimed or heartbeating
    Online,
}

/// Status as reported to owners, derived from heartbeat freshness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Provisioning,
    Online,
    Offline,
}

/// An outstanding claim offer: code, initiating account and expiry travel together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingWindow {
    pub code: String,
    pub initiator: AccountId,
    pub expires_at: DateTime<Utc>,
}

impl PairingWindow {
    /// Whether the window is still claimable at `now` (inclusive of the expiry instant)
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at >= now
    }

    /// Whether `code` claims this window at `now`
    pub fn accepts(&self, code: &str, now: DateTime<Utc>) -> bool {
        // evaluate both so timing does not reveal which check failed
        let code_ok = secret::constant_time_eq(self.code.as_bytes(), code.as_bytes());
        let open = self.is_open_at(now);
        code_ok & open
    }
}

/// A registered kiosk device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: DeviceId,
    pub hardware_id: HardwareId,
    /// Optional human label
    pub name: Option<String>,
    /// Owning account, set only by a successful claim
    pub owner: Option<AccountId>,
    pub status: DeviceStatus,
    /// SHA-256 of the bearer secret
    pub secret_hash: String,
    /// Most recent accepted heartbeat
    pub last_seen: Option<DateTime<Utc>>,
    /// Current pairing window, if a claim is outstanding
    pub pairing: Option<PairingWindow>,
    pub registered_at: DateTime<Utc>,
}

impl Device {
    /// Create a freshly registered, unowned device
    pub fn new(
        device_id: DeviceId,
        hardware_id: HardwareId,
        name: Option<String>,
        secret_hash: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id,
            hardware_id,
            name,
            owner: None,
            status: DeviceStatus::Provisioning,
            secret_hash,
            last_seen: None,
            pairing: None,
            registered_at: now,
        }
    }

    /// Constant-time check of a presented bearer secret
    pub fn verify_secret(&self, secret: &str) -> bool {
        secret::verify_token(secret, &self.secret_hash)
    }

    pub fn is_owned_by(&self, account: &AccountId) -> bool {
        self.owner.as_ref() == Some(account)
    }

    /// Record an accepted heartbeat
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen = Some(now);
        self.status = DeviceStatus::Online;
    }

    /// Presence as seen at `now`, given the staleness bound
    pub fn presence(&self, now: DateTime<Utc>, online_threshold: Duration) -> PresenceStatus {
        match self.last_seen {
            Some(seen) if now - seen < online_threshold => PresenceStatus::Online,
            _ if self.status == DeviceStatus::Provisioning => PresenceStatus::Provisioning,
            _ => PresenceStatus::Offline,
        }
    }
}

/// Trim a device name; empty names become `None`
pub fn normalize_name(raw: Option<&str>) -> AuthResult<Option<String>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) if name.chars().count() > MAX_NAME_LEN => Err(AuthError::invalid_input(
            format!("name longer than {} characters", MAX_NAME_LEN),
        )),
        Some(name) => Ok(Some(name.to_string())),
    }
}

/// Summary information about a device for owner-facing responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub hardware_id: String,
    pub name: Option<String>,
    pub status: PresenceStatus,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl DeviceInfo {
    pub fn from_device(device: &Device, now: DateTime<Utc>, online_threshold: Duration) -> Self {
        Self {
            device_id: device.device_id.to_string(),
            hardware_id: device.hardware_id.to_string(),
            name: device.name.clone(),
            status: device.presence(now, online_threshold),
            last_seen: device.last_seen,
        }
    }
}
