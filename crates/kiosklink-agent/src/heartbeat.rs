//! Heartbeat loop with exponential backoff

use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::client::BackendClient;
use crate::error::AgentResult;

/// Default heartbeat period
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(20);

/// Longest wait between failed attempts
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Delay schedule: fixed interval while healthy, doubling after failures
#[derive(Debug, Clone)]
pub struct Backoff {
    interval: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(interval: Duration, max: Duration) -> Self {
        Self {
            interval,
            max: max.max(interval),
            current: interval,
        }
    }

    /// Delay after a successful heartbeat
    pub fn success(&mut self) -> Duration {
        self.current = self.interval;
        self.current
    }

    /// Delay after a failed heartbeat
    pub fn failure(&mut self) -> Duration {
        self.current = (self.current * 2).min(self.max);
        self.current
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, MAX_BACKOFF)
    }
}

/// Send heartbeats until `shutdown` resolves
///
/// Transport and server errors back off and retry. An `unauthorized` answer
/// means the secret was rotated and ends the loop with that error.
pub async fn run_heartbeat_loop<F>(
    client: &BackendClient,
    device_id: &str,
    device_secret: &str,
    mut backoff: Backoff,
    shutdown: F,
) -> AgentResult<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let delay = match client.heartbeat(device_id, device_secret).await {
            Ok(()) => {
                debug!("Heartbeat accepted for {}", device_id);
                backoff.success()
            }
            Err(e) if e.is_unauthorized() => {
                error!("Heartbeat rejected for {}: device secret no longer valid", device_id);
                return Err(e);
            }
            Err(e) => {
                warn!("Heartbeat failed for {}: {}", device_id, e);
                backoff.failure()
            }
        };

        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
