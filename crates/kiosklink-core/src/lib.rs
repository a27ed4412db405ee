//! KioskLink Core - Shared configuration, time and error types
//!
//! This crate provides the foundational types used across all KioskLink components.

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, PairingTtl};
pub use error::{Error, Result};
