//! Device lifecycle: register once, claim, then heartbeat

use std::future::Future;
use std::path::PathBuf;
use tracing::info;

use crate::client::BackendClient;
use crate::error::{AgentError, AgentResult};
use crate::heartbeat::{run_heartbeat_loop, Backoff};
use crate::state::AgentState;

/// Ties the backend client to the persisted device identity
pub struct Agent {
    client: BackendClient,
    state_path: PathBuf,
    state: AgentState,
}

impl Agent {
    /// Load any stored identity from `state_path`
    pub fn open(client: BackendClient, state_path: PathBuf) -> AgentResult<Self> {
        let state = AgentState::load(&state_path)?;
        Ok(Self {
            client,
            state_path,
            state,
        })
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Register unless an identity is already stored; returns the device ID
    pub async fn ensure_registered(&mut self, hardware_id: &str, name: Option<&str>) -> AgentResult<String> {
        if let Some((device_id, _)) = self.state.credentials() {
            return Ok(device_id.to_string());
        }
        self.register(hardware_id, name).await
    }

    /// Register unconditionally, replacing the stored secret
    ///
    /// The backend rotates the secret on every call, so the previous one
    /// stops working.
    pub async fn register(&mut self, hardware_id: &str, name: Option<&str>) -> AgentResult<String> {
        let response = self.client.register(hardware_id, name).await?;
        info!("Registered as device {}", response.device_id);

        self.state.device_id = Some(response.device_id.clone());
        self.state.device_secret = Some(response.device_secret);
        self.state.claimed = false;
        self.state.save(&self.state_path)?;
        Ok(response.device_id)
    }

    /// Claim the pairing window for `pairing_code`
    pub async fn claim(&mut self, pairing_code: &str) -> AgentResult<()> {
        let (device_id, secret) = self.state.credentials().ok_or(AgentError::NotRegistered)?;
        self.client.claim(device_id, secret, pairing_code).await?;
        info!("Device {} claimed", device_id);

        self.state.claimed = true;
        self.state.save(&self.state_path)?;
        Ok(())
    }

    /// Heartbeat until `shutdown` resolves or the secret is rejected
    pub async fn run<F>(&self, backoff: Backoff, shutdown: F) -> AgentResult<()>
    where
        F: Future<Output = ()>,
    {
        let (device_id, secret) = self.state.credentials().ok_or(AgentError::NotRegistered)?;
        run_heartbeat_loop(&self.client, device_id, secret, backoff, shutdown).await
    }
}
