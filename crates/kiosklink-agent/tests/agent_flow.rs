//! Agent against a real server on an ephemeral port

use kiosklink_agent::{Agent, AgentError, Backoff, BackendClient, DEFAULT_TIMEOUT};
use kiosklink_auth::{AccountId, CredentialStore, PresenceStatus};
use kiosklink_core::{Config, ManualClock};
use kiosklink_server::{create_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const HARDWARE_ID: &str = "de:ad:be:ef:00:01";

async fn start_server() -> (String, Arc<AppState>) {
    let state = Arc::new(AppState::new(
        Config::default(),
        Arc::new(CredentialStore::in_memory()),
        Arc::new(ManualClock::default()),
    ));
    let router = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

fn client(base_url: &str) -> BackendClient {
    BackendClient::new(base_url, DEFAULT_TIMEOUT).unwrap()
}

#[tokio::test]
async fn test_register_claim_and_heartbeat() {
    let (base_url, server) = start_server().await;
    let dir = tempdir().unwrap();
    let state_path = dir.path().join("device_state.json");

    let mut agent = Agent::open(client(&base_url), state_path.clone()).unwrap();
    let device_id = agent.ensure_registered(HARDWARE_ID, Some("Lobby")).await.unwrap();
    assert!(device_id.starts_with("dev-"));

    // a stored identity is reused rather than rotated
    let mut reopened = Agent::open(client(&base_url), state_path.clone()).unwrap();
    assert_eq!(
        reopened.ensure_registered(HARDWARE_ID, None).await.unwrap(),
        device_id
    );

    let alice = AccountId::new();
    let window = server
        .pairing
        .open_by_hardware_id(&alice, HARDWARE_ID, None, Some(120))
        .await
        .unwrap();

    let err = reopened.claim("not-the-code").await.unwrap_err();
    assert_eq!(err.code(), Some("pairing_invalid"));

    reopened.claim(&window.pairing_code).await.unwrap();
    assert!(reopened.state().claimed);

    let shutdown = tokio::time::sleep(Duration::from_millis(200));
    reopened
        .run(Backoff::new(Duration::from_millis(50), Duration::from_secs(1)), shutdown)
        .await
        .unwrap();

    let devices = server.directory.list(&alice).await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_id, device_id);
    assert_eq!(devices[0].name.as_deref(), Some("Lobby"));
    assert_eq!(devices[0].status, PresenceStatus::Online);
    assert!(devices[0].last_seen.is_some());
}

#[tokio::test]
async fn test_rotated_secret_stops_heartbeats() {
    let (base_url, _server) = start_server().await;
    let dir = tempdir().unwrap();

    let mut original = Agent::open(client(&base_url), dir.path().join("a.json")).unwrap();
    original.ensure_registered(HARDWARE_ID, None).await.unwrap();

    let mut replacement = Agent::open(client(&base_url), dir.path().join("b.json")).unwrap();
    replacement.register(HARDWARE_ID, None).await.unwrap();

    let result = original
        .run(Backoff::default(), std::future::pending::<()>())
        .await;
    match result {
        Err(e) => assert!(e.is_unauthorized()),
        Ok(()) => panic!("heartbeat loop should stop on a rotated secret"),
    }
}

#[tokio::test]
async fn test_claim_requires_registration() {
    let (base_url, _server) = start_server().await;
    let dir = tempdir().unwrap();

    let mut agent = Agent::open(client(&base_url), dir.path().join("state.json")).unwrap();
    assert!(matches!(
        agent.claim("123456").await,
        Err(AgentError::NotRegistered)
    ));
}
