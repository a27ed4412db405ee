//! KioskLink Server - Axum-based HTTP API
//!
//! Exposes the device registration, pairing, liveness and ownership
//! operations of `kiosklink-auth` over JSON, plus a minimal account
//! login surface for operators.

pub mod error;
pub mod http;
pub mod session;
pub mod state;
pub mod sweeper;
pub mod tls;

pub use error::{ApiError, ApiResult, ErrorBody};
pub use http::{create_router, MeResponse, OkResponse};
pub use session::{bearer_token, CurrentSession};
pub use state::AppState;
pub use sweeper::{spawn_sweeper, sweep_once, SweepReport};
pub use tls::{calculate_cert_fingerprint, generate_self_signed_cert, TlsError, TlsMaterial, TlsSource};
