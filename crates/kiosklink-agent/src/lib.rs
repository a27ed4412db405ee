//! KioskLink Agent - the device side of the pairing protocol
//!
//! Registers the kiosk with the backend, stores the issued identity, claims
//! a pairing window when an operator supplies the code, and keeps the device
//! marked online with periodic heartbeats.

pub mod agent;
pub mod client;
pub mod error;
pub mod hardware;
pub mod heartbeat;
pub mod state;

pub use agent::Agent;
pub use client::{BackendClient, DEFAULT_TIMEOUT};
pub use error::{AgentError, AgentResult};
pub use hardware::{discover_hardware_id, mac_from_sysfs, HARDWARE_ID_ENV};
pub use heartbeat::{run_heartbeat_loop, Backoff, DEFAULT_INTERVAL, MAX_BACKOFF};
pub use state::AgentState;
