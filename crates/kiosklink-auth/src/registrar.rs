//! Device registration
//!
//! First contact from a device: issue (or re-issue) its identity and bearer
//! secret. The plaintext secret leaves the server exactly once, in the
//! registration response.

use crate::device::{normalize_name, Device, DeviceId, DeviceStatus, HardwareId};
use crate::error::{AuthError, AuthResult};
use crate::secret::{generate_token, hash_token};
use crate::storage::{allocate_device_id, CredentialStore};
use kiosklink_core::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Attempts at drawing an unused device ID before giving up
const MAX_ID_ATTEMPTS: usize = 16;

/// Request to register a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Hardware identifier (MAC address)
    #[serde(alias = "mac")]
    pub hardware_id: String,
    /// Optional display name, only applied when the device is new
    #[serde(default)]
    pub name: Option<String>,
}

/// Identity issued to a device
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub device_id: String,
    /// Plaintext bearer secret, returned only here
    pub device_secret: String,
}

impl std::fmt::Debug for RegisterResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterResponse")
            .field("device_id", &self.device_id)
            .field("device_secret", &"<redacted>")
            .finish()
    }
}

/// Issues device identities and secrets
pub struct Registrar {
    storage: Arc<CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl Registrar {
    pub fn new(storage: Arc<CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Register a device by hardware ID
    ///
    /// A known hardware ID keeps its device ID, name and owner but gets a new
    /// secret; the old secret stops working immediately.
    pub async fn register(
        &self,
        hardware_id: &str,
        name: Option<&str>,
    ) -> AuthResult<RegisterResponse> {
        let hardware_id = HardwareId::parse(hardware_id)?;
        let name = normalize_name(name)?;
        let device_secret = generate_token();
        let secret_hash = hash_token(&device_secret);
        let now = self.clock.now();

        let (device_id, rotated_owned) = self
            .storage
            .upsert_device(
                &hardware_id,
                |device| {
                    device.secret_hash = secret_hash.clone();
                    device.status = DeviceStatus::Provisioning;
                    device.last_seen = None;
                    Ok::<_, AuthError>((device.device_id.clone(), device.owner.is_some()))
                },
                |taken| {
                    let device_id = allocate_device_id(taken, MAX_ID_ATTEMPTS, DeviceId::generate)
                        .ok_or_else(|| {
                            AuthError::Internal("could not allocate a unique device id".to_string())
                        })?;
                    let device = Device::new(
                        device_id.clone(),
                        hardware_id.clone(),
                        name,
                        secret_hash.clone(),
                        now,
                    );
                    Ok((device, (device_id, false)))
                },
            )
            .await?;

        if rotated_owned {
            warn!(
                "Owned device {} ({}) re-registered; secret rotated",
                device_id, hardware_id
            );
        } else {
            info!("Registered device {} ({})", device_id, hardware_id);
        }

        Ok(RegisterResponse {
            device_id: device_id.to_string(),
            device_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountId;
    use kiosklink_core::SystemClock;

    fn create_test_registrar() -> (Registrar, Arc<CredentialStore>) {
        let storage = Arc::new(CredentialStore::in_memory());
        let registrar = Registrar::new(storage.clone(), Arc::new(SystemClock));
        (registrar, storage)
    }

    #[tokio::test]
    async fn test_register_new_device() {
        let (registrar, storage) = create_test_registrar();

        let response = registrar
            .register("AA:BB:CC:DD:EE:FF", Some("Front desk"))
            .await
            .unwrap();
        assert!(response.device_id.starts_with("dev-"));
        assert!(!response.device_secret.is_empty());

        let device = storage
            .read(|data| data.device(&response.device_id).cloned())
            .await
            .unwrap();
        assert_eq!(device.hardware_id.as_str(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(device.name.as_deref(), Some("Front desk"));
        assert_eq!(device.status, DeviceStatus::Provisioning);
        assert!(device.owner.is_none());
        assert_ne!(device.secret_hash, response.device_secret);
        assert!(device.verify_secret(&response.device_secret));
    }

    #[tokio::test]
    async fn test_reregistration_rotates_secret() {
        let (registrar, storage) = create_test_registrar();

        let first = registrar.register("aa:bb", None).await.unwrap();
        let second = registrar.register("AA:BB", Some("ignored")).await.unwrap();

        assert_eq!(first.device_id, second.device_id);
        assert_ne!(first.device_secret, second.device_secret);
        assert_eq!(storage.device_count().await, 1);

        let device = storage
            .read(|data| data.device(&first.device_id).cloned())
            .await
            .unwrap();
        assert!(!device.verify_secret(&first.device_secret));
        assert!(device.verify_secret(&second.device_secret));
        assert!(device.name.is_none());
    }

    #[tokio::test]
    async fn test_reregistration_keeps_owner_and_resets_status() {
        let (registrar, storage) = create_test_registrar();
        let first = registrar.register("aa:bb", None).await.unwrap();
        let owner = AccountId::new();

        storage
            .update_device(&first.device_id, |device| {
                device.owner = Some(owner.clone());
                device.touch(chrono::Utc::now());
                Ok::<_, AuthError>(())
            })
            .await
            .unwrap()
            .unwrap();

        registrar.register("aa:bb", None).await.unwrap();

        let device = storage
            .read(|data| data.device(&first.device_id).cloned())
            .await
            .unwrap();
        assert_eq!(device.owner, Some(owner));
        assert_eq!(device.status, DeviceStatus::Provisioning);
        assert!(device.last_seen.is_none());
    }

    #[tokio::test]
    async fn test_register_rejects_empty_hardware_id() {
        let (registrar, storage) = create_test_registrar();

        let result = registrar.register("   ", None).await;
        assert!(matches!(result, Err(AuthError::InvalidInput(_))));
        assert_eq!(storage.device_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_contact_creates_one_device() {
        let (registrar, storage) = create_test_registrar();
        let registrar = Arc::new(registrar);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registrar = registrar.clone();
                tokio::spawn(async move { registrar.register("aa:bb", None).await.unwrap() })
            })
            .collect();

        let mut device_ids = Vec::new();
        for task in tasks {
            device_ids.push(task.await.unwrap().device_id);
        }
        device_ids.sort();
        device_ids.dedup();
        assert_eq!(device_ids.len(), 1);
        assert_eq!(storage.device_count().await, 1);
    }

    #[test]
    fn test_response_debug_redacts_secret() {
        let response = RegisterResponse {
            device_id: "dev-abc".to_string(),
            device_secret: "super-secret".to_string(),
        };
        let rendered = format!("{:?}", response);
        assert!(!rendered.contains("super-secret"));
    }
}
