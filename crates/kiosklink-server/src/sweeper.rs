//! Background cleanup of expired pairing windows and sessions
//!
//! Claim and session lookup check expiry themselves; this only keeps the
//! store file from accumulating dead entries.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::state::AppState;

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pairing_windows: usize,
    pub sessions: usize,
}

/// Run one sweep
pub async fn sweep_once(state: &AppState) -> SweepReport {
    let mut report = SweepReport::default();

    match state.pairing.purge_expired().await {
        Ok(n) => report.pairing_windows = n,
        Err(e) => warn!("Failed to purge expired pairing windows: {}", e),
    }
    match state.accounts.purge_expired_sessions().await {
        Ok(n) => report.sessions = n,
        Err(e) => warn!("Failed to purge expired sessions: {}", e),
    }

    debug!("Sweep finished: {:?}", report);
    report
}

/// Spawn the periodic sweeper; `None` when the interval is zero
pub fn spawn_sweeper(state: Arc<AppState>, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(&state).await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use kiosklink_auth::{AccountId, CredentialStore};
    use kiosklink_core::{Config, ManualClock};

    #[tokio::test]
    async fn test_sweep_clears_expired_state() {
        let clock = ManualClock::default();
        let state = AppState::new(
            Config::default(),
            Arc::new(CredentialStore::in_memory()),
            Arc::new(clock.clone()),
        );

        state.registrar.register("aa:bb", None).await.unwrap();
        state
            .pairing
            .open_by_hardware_id(&AccountId::new(), "aa:bb", None, Some(60))
            .await
            .unwrap();
        state.accounts.signup("alice", "pw").await.unwrap();

        assert_eq!(sweep_once(&state).await, SweepReport::default());

        clock.advance(ChronoDuration::days(8));
        let report = sweep_once(&state).await;
        assert_eq!(report.pairing_windows, 1);
        assert_eq!(report.sessions, 1);
    }

    #[tokio::test]
    async fn test_zero_interval_disables_sweeper() {
        let state = Arc::new(AppState::new(
            Config::default(),
            Arc::new(CredentialStore::in_memory()),
            Arc::new(ManualClock::default()),
        ));
        assert!(spawn_sweeper(state, Duration::ZERO).is_none());
    }
}
