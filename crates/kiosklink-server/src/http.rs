//! HTTP request handlers
//!
//! Device-facing endpoints authenticate with the device secret in the body;
//! operator-facing endpoints require an account session.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use kiosklink_auth::{
    ClaimRequest, Credentials, DeviceInfo, DeviceList, HeartbeatRequest, OpenPairingRequest,
    PairByHardwareIdRequest, PairingResponse, RegisterRequest, RegisterResponse, RenameRequest,
    SessionGrant, UserInfo,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, warn};

use crate::error::ApiResult;
use crate::session::CurrentSession;
use crate::state::AppState;

/// Body-extraction result; malformed JSON becomes `invalid_input`
type JsonBody<T> = Result<Json<T>, JsonRejection>;

/// `{"ok": true}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    fn ok() -> Json<Self> {
        Json(Self { ok: true })
    }
}

/// `GET /auth/me` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserInfo,
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let timeout = TimeoutLayer::new(state.config.request_timeout());

    Router::new()
        // Device protocol
        .route("/devices/register", post(register_handler))
        .route("/devices/pair_by_hardware_id", post(pair_by_hardware_id_handler))
        .route("/devices/:device_id/pair", post(pair_handler))
        .route("/devices/:device_id/claim", post(claim_handler))
        .route("/devices/:device_id/heartbeat", post(heartbeat_handler))
        .route("/devices/:device_id/rename", post(rename_handler))
        .route("/devices/:device_id", get(get_device_handler))
        .route("/devices", get(list_devices_handler))
        // Accounts
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/me", get(me_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/healthz", get(health_handler))
        .layer(timeout)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Device self-registration (no session)
async fn register_handler(
    State(state): State<Arc<AppState>>,
    body: JsonBody<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let Json(req) = body?;
    let response = state
        .registrar
        .register(&req.hardware_id, req.name.as_deref())
        .await?;
    Ok(Json(response))
}

/// Open a pairing window by device ID
async fn pair_handler(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
    Path(device_id): Path<String>,
    body: JsonBody<OpenPairingRequest>,
) -> ApiResult<Json<PairingResponse>> {
    let Json(req) = body?;
    let response = state
        .pairing
        .open_by_device_id(
            &session.account.id,
            &device_id,
            req.pairing_code.as_deref(),
            req.ttl_sec,
        )
        .await?;
    Ok(Json(response))
}

/// Open a pairing window by hardware ID
async fn pair_by_hardware_id_handler(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
    body: JsonBody<PairByHardwareIdRequest>,
) -> ApiResult<Json<PairingResponse>> {
    let Json(req) = body?;
    let response = state
        .pairing
        .open_by_hardware_id(
            &session.account.id,
            &req.hardware_id,
            req.pairing_code.as_deref(),
            req.ttl_sec,
        )
        .await?;
    Ok(Json(response))
}

/// Device consumes its pairing window (no session)
async fn claim_handler(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    body: JsonBody<ClaimRequest>,
) -> ApiResult<Json<OkResponse>> {
    let Json(req) = body?;
    state
        .pairing
        .claim(&device_id, &req.device_secret, &req.pairing_code)
        .await?;
    Ok(OkResponse::ok())
}

/// Device heartbeat (no session)
async fn heartbeat_handler(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    body: JsonBody<HeartbeatRequest>,
) -> ApiResult<Json<OkResponse>> {
    let Json(req) = body?;
    state
        .liveness
        .heartbeat(&device_id, &req.device_secret)
        .await?;
    Ok(OkResponse::ok())
}

/// List the caller's devices
async fn list_devices_handler(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
) -> Json<DeviceList> {
    let devices = state.directory.list(&session.account.id).await;
    debug!(
        "Listing {} devices for {}",
        devices.len(),
        session.account.username
    );
    Json(DeviceList { devices })
}

/// Single device view, owner only
async fn get_device_handler(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
    Path(device_id): Path<String>,
) -> ApiResult<Json<DeviceInfo>> {
    let device = state.directory.get(&session.account.id, &device_id).await?;
    Ok(Json(device))
}

/// Rename a device, owner only
async fn rename_handler(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
    Path(device_id): Path<String>,
    body: JsonBody<RenameRequest>,
) -> ApiResult<Json<OkResponse>> {
    let Json(req) = body?;
    state
        .directory
        .rename(&session.account.id, &device_id, &req.name)
        .await?;
    Ok(OkResponse::ok())
}

async fn signup_handler(
    State(state): State<Arc<AppState>>,
    body: JsonBody<Credentials>,
) -> ApiResult<(StatusCode, Json<SessionGrant>)> {
    let Json(creds) = body?;
    let grant = state
        .accounts
        .signup(&creds.username, &creds.password)
        .await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    body: JsonBody<Credentials>,
) -> ApiResult<Json<SessionGrant>> {
    let Json(creds) = body?;
    let grant = state
        .accounts
        .login(&creds.username, &creds.password)
        .await?;
    Ok(Json(grant))
}

async fn me_handler(session: CurrentSession) -> Json<MeResponse> {
    Json(MeResponse {
        user: UserInfo::from(&session.account),
    })
}

async fn logout_handler(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
) -> ApiResult<Json<OkResponse>> {
    state.accounts.logout(&session.token).await?;
    Ok(OkResponse::ok())
}

async fn health_handler() -> Json<OkResponse> {
    OkResponse::ok()
}
