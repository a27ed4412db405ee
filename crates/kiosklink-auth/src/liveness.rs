//! Heartbeat handling

use crate::error::{AuthError, AuthResult};
use crate::storage::CredentialStore;
use kiosklink_core::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Device heartbeat request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(alias = "device_token")]
    pub device_secret: String,
}

/// Records secret-authenticated liveness signals
pub struct LivenessTracker {
    storage: Arc<CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl LivenessTracker {
    pub fn new(storage: Arc<CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Accept a heartbeat, updating `last_seen` and marking the device online
    ///
    /// Unknown devices and wrong secrets are both `Unauthorized`, and neither
    /// touches `last_seen`. Nothing here ever marks a device offline.
    pub async fn heartbeat(&self, device_id: &str, device_secret: &str) -> AuthResult<()> {
        let device_secret = device_secret.trim();
        if device_secret.is_empty() {
            return Err(AuthError::invalid_input("device_secret is required"));
        }
        let now = self.clock.now();

        let result = self
            .storage
            .update_device(device_id, |device| {
                if !device.verify_secret(device_secret) {
                    return Err(AuthError::Unauthorized);
                }
                device.touch(now);
                Ok(())
            })
            .await
            .and_then(|found| found.ok_or(AuthError::Unauthorized));

        match &result {
            Ok(()) => debug!("Heartbeat from device {}", device_id),
            Err(AuthError::Unauthorized) => {
                warn!("Heartbeat rejected for device {}", device_id)
            }
            Err(_) => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceStatus;
    use crate::registrar::Registrar;
    use chrono::Duration;
    use kiosklink_core::ManualClock;

    fn create_test_tracker() -> (LivenessTracker, Registrar, Arc<CredentialStore>, ManualClock) {
        let storage = Arc::new(CredentialStore::in_memory());
        let clock = ManualClock::default();
        let tracker = LivenessTracker::new(storage.clone(), Arc::new(clock.clone()));
        let registrar = Registrar::new(storage.clone(), Arc::new(clock.clone()));
        (tracker, registrar, storage, clock)
    }

    #[tokio::test]
    async fn test_heartbeat_updates_last_seen() {
        let (tracker, registrar, storage, clock) = create_test_tracker();
        let reg = registrar.register("aa:bb", None).await.unwrap();

        clock.advance(Duration::seconds(5));
        tracker
            .heartbeat(&reg.device_id, &reg.device_secret)
            .await
            .unwrap();

        let device = storage
            .read(|data| data.device(&reg.device_id).cloned())
            .await
            .unwrap();
        assert_eq!(device.last_seen, Some(clock.now()));
        assert_eq!(device.status, DeviceStatus::Online);
    }

    #[tokio::test]
    async fn test_wrong_secret_never_updates_last_seen() {
        let (tracker, registrar, storage, _clock) = create_test_tracker();
        let reg = registrar.register("aa:bb", None).await.unwrap();

        let result = tracker.heartbeat(&reg.device_id, "wrong").await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));

        let device = storage
            .read(|data| data.device(&reg.device_id).cloned())
            .await
            .unwrap();
        assert!(device.last_seen.is_none());
        assert_eq!(device.status, DeviceStatus::Provisioning);
    }

    #[tokio::test]
    async fn test_unknown_device_is_unauthorized() {
        let (tracker, _registrar, _storage, _clock) = create_test_tracker();
        let result = tracker.heartbeat("dev-missing", "secret").await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_rotated_secret_is_rejected() {
        let (tracker, registrar, _storage, _clock) = create_test_tracker();
        let first = registrar.register("aa:bb", None).await.unwrap();
        let second = registrar.register("aa:bb", None).await.unwrap();

        assert!(matches!(
            tracker.heartbeat(&first.device_id, &first.device_secret).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(tracker
            .heartbeat(&second.device_id, &second.device_secret)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_empty_secret_is_invalid_input() {
        let (tracker, registrar, _storage, _clock) = create_test_tracker();
        let reg = registrar.register("aa:bb", None).await.unwrap();
        assert!(matches!(
            tracker.heartbeat(&reg.device_id, "").await,
            Err(AuthError::InvalidInput(_))
        ));
    }
}
