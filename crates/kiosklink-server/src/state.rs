//! Shared request-handling context
//!
//! Handlers hold no mutable state of their own: everything durable lives in
//! the credential store, reached through the protocol services here.

use chrono::Duration;
use kiosklink_auth::{
    AccountService, CredentialStore, LivenessTracker, OwnershipDirectory, PairingCoordinator,
    Registrar,
};
use kiosklink_core::{Clock, Config};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Backing store, shared by every service below
    pub storage: Arc<CredentialStore>,
    pub registrar: Registrar,
    pub pairing: PairingCoordinator,
    pub liveness: LivenessTracker,
    pub directory: OwnershipDirectory,
    pub accounts: AccountService,
}

impl AppState {
    /// Wire every service to one store and one clock
    pub fn new(config: Config, storage: Arc<CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registrar: Registrar::new(storage.clone(), clock.clone()),
            pairing: PairingCoordinator::new(storage.clone(), clock.clone(), config.pairing_ttl),
            liveness: LivenessTracker::new(storage.clone(), clock.clone()),
            directory: OwnershipDirectory::new(
                storage.clone(),
                clock.clone(),
                Duration::seconds(config.online_threshold_secs),
            ),
            accounts: AccountService::new(
                storage.clone(),
                clock,
                Duration::seconds(config.session_ttl_secs),
            ),
            storage,
            config,
        }
    }
}
