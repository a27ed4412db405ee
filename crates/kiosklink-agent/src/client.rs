//! Reqwest-backed client for the device endpoints

use kiosklink_auth::{ClaimRequest, HeartbeatRequest, RegisterRequest, RegisterResponse};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{AgentError, AgentResult};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: String,
    #[serde(default)]
    message: String,
}

/// Talks to one KioskLink backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    /// Build a client with an explicit request timeout
    pub fn new(base_url: &str, timeout: Duration) -> AgentResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register and receive a device ID plus a fresh secret
    pub async fn register(&self, hardware_id: &str, name: Option<&str>) -> AgentResult<RegisterResponse> {
        let body = RegisterRequest {
            hardware_id: hardware_id.to_string(),
            name: name.map(str::to_string),
        };
        let response = self.post("/devices/register", &body).await?;
        decode(response).await
    }

    /// Claim a pairing window opened by an operator
    pub async fn claim(&self, device_id: &str, device_secret: &str, pairing_code: &str) -> AgentResult<()> {
        let body = ClaimRequest {
            device_secret: device_secret.to_string(),
            pairing_code: pairing_code.to_string(),
        };
        let response = self.post(&format!("/devices/{}/claim", device_id), &body).await?;
        expect_ok(response).await
    }

    /// Report liveness
    pub async fn heartbeat(&self, device_id: &str, device_secret: &str) -> AgentResult<()> {
        let body = HeartbeatRequest {
            device_secret: device_secret.to_string(),
        };
        let response = self
            .post(&format!("/devices/{}/heartbeat", device_id), &body)
            .await?;
        expect_ok(response).await
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> AgentResult<Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        Ok(self.client.post(url).json(body).send().await?)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> AgentResult<T> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(response.json().await?)
}

async fn expect_ok(response: Response) -> AgentResult<()> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(())
}

async fn api_error(response: Response) -> AgentError {
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    match serde_json::from_slice::<ErrorEnvelope>(&body) {
        Ok(envelope) => AgentError::Api {
            status: status.as_u16(),
            code: envelope.error,
            message: envelope.message,
        },
        Err(_) => AgentError::Api {
            status: status.as_u16(),
            code: "unknown".to_string(),
            message: String::from_utf8_lossy(&body).into_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = BackendClient::new("http://localhost:5656/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5656");
    }
}
