//! Persisted device identity

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{AgentError, AgentResult};

/// What the device remembers between boots
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub device_id: Option<String>,
    /// Bearer secret issued at registration
    #[serde(alias = "device_token")]
    pub device_secret: Option<String>,
    #[serde(default)]
    pub claimed: bool,
}

impl std::fmt::Debug for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentState")
            .field("device_id", &self.device_id)
            .field("device_secret", &self.device_secret.as_ref().map(|_| "<redacted>"))
            .field("claimed", &self.claimed)
            .finish()
    }
}

impl AgentState {
    /// Default location (~/.local/share/kiosklink/device_state.json)
    pub fn default_path() -> AgentResult<PathBuf> {
        let data_dir = dirs::data_dir().ok_or(AgentError::NoDataDir)?;
        Ok(data_dir.join("kiosklink").join("device_state.json"))
    }

    /// Load state; a missing file is an unregistered device
    pub fn load(path: &Path) -> AgentResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No agent state at {:?}", path);
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write state through a temp file and rename
    pub fn save(&self, path: &Path) -> AgentResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Stored credentials, if any
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.device_id, &self.device_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = tempdir().unwrap();
        let state = AgentState::load(&dir.path().join("none.json")).unwrap();
        assert_eq!(state, AgentState::default());
        assert!(state.credentials().is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("device_state.json");

        let state = AgentState {
            device_id: Some("dev-abc".to_string()),
            device_secret: Some("s3cret".to_string()),
            claimed: true,
        };
        state.save(&path).unwrap();

        let loaded = AgentState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.credentials(), Some(("dev-abc", "s3cret")));
    }

    #[test]
    fn test_reads_legacy_token_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"device_id":"dev-1","device_token":"tok"}"#).unwrap();

        let loaded = AgentState::load(&path).unwrap();
        assert_eq!(loaded.device_secret.as_deref(), Some("tok"));
        assert!(!loaded.claimed);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let state = AgentState {
            device_id: Some("dev-1".to_string()),
            device_secret: Some("hunter2".to_string()),
            claimed: false,
        };
        assert!(!format!("{:?}", state).contains("hunter2"));
    }
}
