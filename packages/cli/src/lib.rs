// ABOUTME: Server bootstrap for the pairroom binary
// ABOUTME: Wires configuration, storage, sandbox, and rooms into the HTTP server with graceful shutdown

use axum::http::{HeaderValue, Method};
use axum::Router;
use clap::Parser;
use pairroom_api::{create_router, AppState};
use pairroom_config::{Config, ConfigError};
use pairroom_rooms::{FrameLimits, RoomStateStore};
use pairroom_sandbox::ProcessExecutor;
use pairroom_storage::{PersistenceBridge, SqliteRoomStore};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for unwritten room snapshots
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Command-line flags. Anything not given falls back to the environment.
#[derive(Debug, Default, Parser)]
#[command(name = "pairroom")]
#[command(about = "Pairroom - shared code rooms with sandboxed execution")]
#[command(version)]
pub struct Cli {
    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Allowed CORS origin ("*" allows any)
    #[arg(long)]
    pub cors_origin: Option<String>,

    /// SQLite database URL, e.g. sqlite://pairroom.db or sqlite::memory:
    #[arg(long)]
    pub database_url: Option<String>,

    /// Execution time budget in milliseconds
    #[arg(long)]
    pub exec_timeout_ms: Option<u64>,

    /// Python interpreter used for execution
    #[arg(long)]
    pub python: Option<String>,
}

impl Cli {
    /// Overlay the given flags on `config` and re-check it
    pub fn apply_to(&self, mut config: Config) -> Result<Config, ConfigError> {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(origin) = &self.cors_origin {
            config.cors_origin = origin.clone();
        }
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
        if let Some(timeout_ms) = self.exec_timeout_ms {
            config.execution.timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(python) = &self.python {
            config.execution.python_bin = python.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (e.g. in tests) is harmless
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origin.trim() == "*" {
        return Ok(layer.allow_origin(Any));
    }

    let origin = origin
        .parse::<HeaderValue>()
        .map_err(|e| anyhow::anyhow!("invalid CORS origin '{}': {}", origin, e))?;
    Ok(layer.allow_origin(origin))
}

/// Build storage, sandbox, and rooms from configuration
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let store = Arc::new(SqliteRoomStore::connect(&config.database_url).await?);
    let bridge = PersistenceBridge::spawn(store, config.load_timeout);
    let executor = Arc::new(ProcessExecutor::from_limits(&config.execution));
    let rooms = RoomStateStore::new(bridge, executor);
    Ok(AppState::new(rooms, FrameLimits::from_config(config)))
}

pub fn build_app(state: AppState, config: &Config) -> anyhow::Result<Router> {
    Ok(create_router(state)
        .layer(cors_layer(&config.cors_origin)?)
        .layer(TraceLayer::new_for_http()))
}

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    let bridge = state.rooms.bridge().clone();
    let app = build_app(state, &config)?;

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!(address = %listener.local_addr()?, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(pending = bridge.pending_count(), "Flushing room state before exit");
    if !bridge.flush(SHUTDOWN_FLUSH_TIMEOUT).await {
        warn!(pending = bridge.pending_count(), "Exiting with unsaved room state");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
