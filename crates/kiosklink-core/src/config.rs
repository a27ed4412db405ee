//! Configuration types for KioskLink

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Bounds applied to pairing window lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingTtl {
    /// TTL used when the caller does not ask for one
    pub default_secs: i64,
    /// Shortest window the server will open
    pub min_secs: i64,
    /// Longest window the server will open
    pub max_secs: i64,
}

impl Default for PairingTtl {
    fn default() -> Self {
        Self {
            default_secs: 300,
            min_secs: 60,
            max_secs: 900,
        }
    }
}

impl PairingTtl {
    /// Resolve a requested TTL into the server-enforced range
    ///
    /// A requested TTL of zero counts as unset and takes the default.
    pub fn clamp(&self, requested: Option<i64>) -> i64 {
        requested
            .filter(|&secs| secs != 0)
            .unwrap_or(self.default_secs)
            .clamp(self.min_secs, self.max_secs)
    }
}

/// Main configuration for the KioskLink backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen address
    pub bind: IpAddr,
    /// Server port
    pub port: u16,
    /// Credential store file
    pub data_path: PathBuf,
    /// Pairing window lifetime bounds
    pub pairing_ttl: PairingTtl,
    /// A device is reported online while its last heartbeat is younger than this
    pub online_threshold_secs: i64,
    /// Account session lifetime
    pub session_ttl_secs: i64,
    /// Upper bound on any single HTTP request
    pub request_timeout_secs: u64,
    /// Period of the expired-window sweeper (0 disables it)
    pub sweep_interval_secs: u64,
    /// Origins allowed to make credentialed cross-origin requests
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5656,
            data_path: PathBuf::from("kiosklink-store.json"),
            pairing_ttl: PairingTtl::default(),
            online_threshold_secs: 60,
            session_ttl_secs: 7 * 24 * 60 * 60,
            request_timeout_secs: 10,
            sweep_interval_secs: 300,
            cors_origins: [
                "http://localhost:5656",
                "http://127.0.0.1:5656",
                "http://localhost:3000",
                "http://127.0.0.1:3000",
                "http://localhost:5173",
                "http://127.0.0.1:5173",
                "http://localhost:8080",
                "http://127.0.0.1:8080",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Default store location (~/.config/kiosklink/store.json)
    pub fn default_data_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(Error::NoConfigDir)?;
        Ok(config_dir.join("kiosklink").join("store.json"))
    }

    /// Builder pattern: set listen address
    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern: set store path
    pub fn with_data_path(mut self, path: PathBuf) -> Self {
        self.data_path = path;
        self
    }

    /// Builder pattern: set pairing TTL bounds
    pub fn with_pairing_ttl(mut self, ttl: PairingTtl) -> Self {
        self.pairing_ttl = ttl;
        self
    }

    /// Builder pattern: set online threshold
    pub fn with_online_threshold_secs(mut self, secs: i64) -> Self {
        self.online_threshold_secs = secs;
        self
    }

    /// Builder pattern: set session lifetime
    pub fn with_session_ttl_secs(mut self, secs: i64) -> Self {
        self.session_ttl_secs = secs;
        self
    }

    /// Builder pattern: set request timeout
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Builder pattern: set sweeper period
    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }

    /// Builder pattern: set CORS origins
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let ttl = &self.pairing_ttl;
        if ttl.min_secs <= 0 {
            return Err(Error::config("pairing TTL minimum must be positive"));
        }
        if ttl.min_secs > ttl.max_secs {
            return Err(Error::config(format!(
                "pairing TTL minimum ({}) exceeds maximum ({})",
                ttl.min_secs, ttl.max_secs
            )));
        }
        if !(ttl.min_secs..=ttl.max_secs).contains(&ttl.default_secs) {
            return Err(Error::config(format!(
                "pairing TTL default ({}) outside {}..={}",
                ttl.default_secs, ttl.min_secs, ttl.max_secs
            )));
        }
        if self.online_threshold_secs <= 0 {
            return Err(Error::config("online threshold must be positive"));
        }
        if self.session_ttl_secs <= 0 {
            return Err(Error::config("session TTL must be positive"));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::config("request timeout must be non-zero"));
        }
        Ok(())
    }
}
