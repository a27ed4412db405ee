//! KioskLink - device identity, pairing and liveness backend
//!
//! Serves the registration, pairing, heartbeat and ownership API for
//! unattended kiosk devices.

use anyhow::{Context, Result};
use clap::Parser;
use kiosklink_auth::CredentialStore;
use kiosklink_core::{Config, PairingTtl, SystemClock};
use kiosklink_server::{create_router, spawn_sweeper, AppState, TlsSource};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// KioskLink - pair unattended kiosks with their owners
#[derive(Parser, Debug)]
#[command(name = "kiosklink")]
#[command(version, about, long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, env = "KIOSKLINK_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Server port
    #[arg(short, long, env = "KIOSKLINK_PORT", default_value = "5656")]
    port: u16,

    /// Credential store file (default: ~/.config/kiosklink/store.json)
    #[arg(long, env = "KIOSKLINK_DATA")]
    data: Option<PathBuf>,

    /// Pairing window lifetime when the operator does not choose one
    #[arg(long, env = "KIOSKLINK_PAIRING_TTL", default_value = "300")]
    pairing_ttl: i64,

    /// Shortest pairing window the server will open
    #[arg(long, env = "KIOSKLINK_PAIRING_TTL_MIN", default_value = "60")]
    pairing_ttl_min: i64,

    /// Longest pairing window the server will open
    #[arg(long, env = "KIOSKLINK_PAIRING_TTL_MAX", default_value = "900")]
    pairing_ttl_max: i64,

    /// Seconds since the last heartbeat before a device counts as offline
    #[arg(long, env = "KIOSKLINK_ONLINE_THRESHOLD", default_value = "60")]
    online_threshold: i64,

    /// Account session lifetime in seconds
    #[arg(long, env = "KIOSKLINK_SESSION_TTL", default_value = "604800")]
    session_ttl: i64,

    /// Per-request timeout in seconds
    #[arg(long, env = "KIOSKLINK_REQUEST_TIMEOUT", default_value = "10")]
    request_timeout: u64,

    /// Expired-window sweeper period in seconds (0 disables)
    #[arg(long, env = "KIOSKLINK_SWEEP_INTERVAL", default_value = "300")]
    sweep_interval: u64,

    /// Allowed CORS origin (repeatable; replaces the localhost defaults)
    #[arg(long = "cors-origin", env = "KIOSKLINK_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Vec<String>,

    /// Path to TLS certificate file (PEM format)
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// Generate and persist a self-signed certificate next to the store
    #[arg(long, conflicts_with = "cert")]
    self_signed: bool,

    /// Bootstrap admin username
    #[arg(long, env = "KIOSKLINK_ADMIN_USER", requires = "admin_pass")]
    admin_user: Option<String>,

    /// Bootstrap admin password
    #[arg(long, env = "KIOSKLINK_ADMIN_PASS", hide_env_values = true)]
    admin_pass: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> Result<Config> {
        let data_path = match &self.data {
            Some(path) => path.clone(),
            None => Config::default_data_path()?,
        };

        let mut config = Config::new()
            .with_bind(self.bind)
            .with_port(self.port)
            .with_data_path(data_path)
            .with_pairing_ttl(PairingTtl {
                default_secs: self.pairing_ttl,
                min_secs: self.pairing_ttl_min,
                max_secs: self.pairing_ttl_max,
            })
            .with_online_threshold_secs(self.online_threshold)
            .with_session_ttl_secs(self.session_ttl)
            .with_request_timeout_secs(self.request_timeout)
            .with_sweep_interval_secs(self.sweep_interval);
        if !self.cors_origins.is_empty() {
            config = config.with_cors_origins(self.cors_origins.clone());
        }

        config.validate()?;
        Ok(config)
    }

    fn tls_source(&self, config: &Config) -> Option<TlsSource> {
        match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => Some(TlsSource::Files {
                cert: cert.clone(),
                key: key.clone(),
            }),
            _ if self.self_signed => {
                let dir = config
                    .data_path
                    .parent()
                    .map(|p| p.join("tls"))
                    .unwrap_or_else(|| PathBuf::from("tls"));
                Some(TlsSource::SelfSigned {
                    dir,
                    hostnames: vec![config.bind.to_string()],
                })
            }
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("KioskLink v{}", env!("CARGO_PKG_VERSION"));

    let config = args.config()?;

    let storage = CredentialStore::with_path(config.data_path.clone())
        .await
        .with_context(|| format!("failed to open credential store {:?}", config.data_path))?;
    info!(
        "Credential store {:?} ({} devices)",
        config.data_path,
        storage.device_count().await
    );

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(storage),
        Arc::new(SystemClock),
    ));

    if let (Some(user), Some(pass)) = (&args.admin_user, &args.admin_pass) {
        if !state.accounts.ensure_admin(user, pass).await? {
            info!("Admin account {} already exists", user.trim().to_lowercase());
        }
    }

    let sweeper = spawn_sweeper(
        state.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    );

    let router = create_router(state);
    let addr = SocketAddr::new(config.bind, config.port);

    if let Some(source) = args.tls_source(&config) {
        let material = source.load().context("failed to load TLS certificate")?;
        info!("Certificate fingerprint: {}", material.fingerprint);
        let tls_config = material.rustls_config().await?;

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });

        info!("Listening on https://{}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(router.into_make_service())
            .await?;
    } else {
        warn!("TLS disabled; device secrets travel in cleartext");
        let shutdown = async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        };

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        info!("Listening on http://{}", addr);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
    }

    if let Some(handle) = sweeper {
        handle.abort();
    }

    info!("Goodbye!");
    Ok(())
}
