//! Error types for KioskLink

use thiserror::Error;

/// Main error type for KioskLink configuration and startup
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration directory not found")]
    NoConfigDir,
}

/// Result type alias using KioskLink's Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }
}
