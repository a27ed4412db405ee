//! kiosklink-agent - runs on the kiosk

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kiosklink_agent::{
    discover_hardware_id, Agent, AgentState, Backoff, BackendClient, MAX_BACKOFF,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// KioskLink device agent
#[derive(Parser, Debug)]
#[command(name = "kiosklink-agent")]
#[command(version, about, long_about = None)]
struct Args {
    /// Backend base URL
    #[arg(long, env = "KIOSKLINK_BACKEND_URL", default_value = "http://localhost:5656")]
    backend: String,

    /// Device state file (default: ~/.local/share/kiosklink/device_state.json)
    #[arg(long, env = "KIOSKLINK_STATE")]
    state: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register with the backend (rotates the secret if already registered)
    Register {
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
    /// Claim a pairing window
    Claim {
        /// Pairing code from the operator
        #[arg(long)]
        code: String,
    },
    /// Register if needed, then send heartbeats until interrupted
    Run {
        /// Display name used on first registration
        #[arg(long)]
        name: Option<String>,
        /// Heartbeat period in seconds
        #[arg(long, default_value = "20")]
        interval: u64,
    },
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

    let state_path = match args.state {
        Some(path) => path,
        None => AgentState::default_path()?,
    };
    let client = BackendClient::new(&args.backend, Duration::from_secs(args.timeout))?;
    let mut agent = Agent::open(client, state_path.clone())
        .with_context(|| format!("failed to load agent state {:?}", state_path))?;

    match args.command {
        Command::Register { name } => {
            let hardware_id = discover_hardware_id()?;
            let device_id = agent.register(&hardware_id, name.as_deref()).await?;
            println!("{}", device_id);
        }
        Command::Claim { code } => {
            agent.claim(&code).await.context("claim failed")?;
            println!("claimed");
        }
        Command::Run { name, interval } => {
            let hardware_id = discover_hardware_id()?;
            let device_id = agent
                .ensure_registered(&hardware_id, name.as_deref())
                .await?;
            info!("Running as device {} against {}", device_id, args.backend);

            let backoff = Backoff::new(Duration::from_secs(interval), MAX_BACKOFF);
            let shutdown = async {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down...");
            };
            agent.run(backoff, shutdown).await?;
        }
    }

    Ok(())
}
