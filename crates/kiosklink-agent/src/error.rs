//! Agent error types

use thiserror::Error;

/// Errors raised on the device side
#[derive(Debug, Error)]
pub enum AgentError {
    /// Transport failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an error envelope
    #[error("backend rejected request ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No stored identity; `register` has to run first
    #[error("device is not registered")]
    NotRegistered,

    #[error("no usable hardware ID found")]
    NoHardwareId,

    #[error("could not determine data directory")]
    NoDataDir,
}

pub type AgentResult<T> = Result<T, AgentError>;

impl AgentError {
    /// Backend error code, if the backend produced one
    pub fn code(&self) -> Option<&str> {
        match self {
            AgentError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// The stored secret is no longer accepted
    pub fn is_unauthorized(&self) -> bool {
        self.code() == Some("unauthorized")
    }

    /// Worth retrying later (transport failure or server-side fault)
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Http(_) => true,
            AgentError::Api { status, .. } => *status >= 500 || *status == 408,
            _ => false,
        }
    }
}
