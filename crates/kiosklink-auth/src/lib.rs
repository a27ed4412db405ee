//! KioskLink Auth - Device identity, pairing and liveness
//!
//! Binds unattended kiosk devices to exactly one account holder without any
//! input mechanism on the device itself.
//!
//! # Protocol
//!
//! 1. The device calls [`Registrar::register`] with its hardware ID and
//!    receives a device ID plus a bearer secret (returned only once)
//! 2. An authenticated account opens a pairing window on that device via
//!    [`PairingCoordinator::open_by_device_id`] or
//!    [`PairingCoordinator::open_by_hardware_id`]
//! 3. The pairing code reaches the device out of band; the device calls
//!    [`PairingCoordinator::claim`] with its secret and the code
//! 4. The device sends periodic [`LivenessTracker::heartbeat`]s
//! 5. The owner lists and renames devices through [`OwnershipDirectory`]
//!
//! All state lives in the [`CredentialStore`]; every mutation is one store
//! transaction scoped to the device (or the account table) it touches.
//!
//! # Example
//!
//! ```no_run
//! use kiosklink_auth::{AccountId, CredentialStore, PairingCoordinator, Registrar};
//! use kiosklink_core::{PairingTtl, SystemClock};
//! use std::sync::Arc;
//!
//! async fn example() {
//!     let storage = Arc::new(CredentialStore::in_memory());
//!     let clock = Arc::new(SystemClock);
//!     let registrar = Registrar::new(storage.clone(), clock.clone());
//!     let pairing = PairingCoordinator::new(storage, clock, PairingTtl::default());
//!
//!     let identity = registrar.register("aa:bb:cc:dd:ee:ff", None).await.unwrap();
//!     let alice = AccountId::new();
//!     let window = pairing
//!         .open_by_hardware_id(&alice, "aa:bb:cc:dd:ee:ff", None, Some(120))
//!         .await
//!         .unwrap();
//!
//!     pairing
//!         .claim(&identity.device_id, &identity.device_secret, &window.pairing_code)
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod account;
pub mod accounts;
pub mod device;
pub mod directory;
pub mod error;
pub mod liveness;
pub mod pairing;
pub mod registrar;
pub mod secret;
pub mod storage;

pub use account::{Account, AccountId, Role, Session, UserInfo};
pub use accounts::{AccountService, Credentials, SessionGrant};
pub use device::{
    Device, DeviceId, DeviceInfo, DeviceStatus, HardwareId, PairingWindow, PresenceStatus,
};
pub use directory::{DeviceList, OwnershipDirectory, RenameRequest};
pub use error::{AuthError, AuthResult};
pub use liveness::{HeartbeatRequest, LivenessTracker};
pub use pairing::{
    ClaimRequest, OpenPairingRequest, PairByHardwareIdRequest, PairingCoordinator,
    PairingResponse, MAX_PAIRING_CODE_LEN,
};
pub use registrar::{RegisterRequest, RegisterResponse, Registrar};
pub use storage::{
    allocate_device_id, AccountData, CredentialStore, StorageError, StorageResult, StoredData,
};
