//! LiftLive Daemon - live set gateway and training API
//!
//! Serves the WebSocket gateway (`/ws`) and the REST API on one port.
//! Finished sets are recorded in the local history database.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use liftlive_daemon::config::DaemonConfig;
use liftlive_daemon::hooks::{HookOptions, SetHooks};
use liftlive_daemon::routes::{api_router, AppState};
use liftlive_daemon::shorts::{ShortsCurator, StaticShortsSource};
use liftlive_gateway::{GatewayServer, LiveGateway};
use liftlive_metrics::HistoryStore;

#[derive(Parser, Debug)]
#[command(name = "liftlive-daemon", version, about = "LiftLive live set gateway and API")]
struct Cli {
    /// Configuration file (default: <config_dir>/liftlive/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port (overrides config and PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Listen address (overrides config)
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_level(true)
        .init();

    info!("🏋️ Starting LiftLive Daemon v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load_from(path),
        None => DaemonConfig::load(),
    }
    .context("Failed to load configuration")?;
    config
        .apply_env()
        .context("Invalid environment override")?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }

    info!("📋 Configuration loaded from {}", config.config_path.display());

    // History database
    let db_path = config.history_db_path()?;
    let history = Arc::new(HistoryStore::new(&db_path).context("Failed to open history database")?);
    info!(
        "🗄️ History database at {} ({} sets)",
        db_path.display(),
        history.set_count().unwrap_or(0)
    );

    // Live gateway
    let gateway = Arc::new(LiveGateway::new(config.gateway_config()));
    let watchdog = gateway.spawn_watchdog();
    match config.active_set_timeout() {
        Some(timeout) => info!("⏱️ Active sets expire after {}s idle", timeout.as_secs()),
        None => warn!("⚠️ Active set timeout disabled"),
    }

    // Rest-period feed and lifecycle hooks
    let source = Arc::new(StaticShortsSource::new(config.shorts.video_ids.clone()));
    let shorts = Arc::new(ShortsCurator::new(
        source,
        Duration::from_secs(config.shorts.cache_ttl_secs),
    ));
    let hooks = SetHooks::new(
        Arc::clone(&gateway),
        Arc::clone(&history),
        Arc::clone(&shorts),
        HookOptions {
            rest_cues: config.rest_cues,
            rest_queue_size: config.rest_queue_size,
        },
    )
    .spawn();

    // HTTP + WebSocket
    let state = AppState {
        gateway: Arc::clone(&gateway),
        history,
        shorts,
    };
    let routes = api_router(state, config.frontend_origin.as_deref());
    let server = GatewayServer::with_routes(Arc::clone(&gateway), routes);
    let addr = server
        .start(config.socket_addr())
        .await
        .context("Failed to start server")?;

    info!("🚀 LiftLive daemon ready!");
    info!("   WebSocket: ws://{}/ws", addr);
    info!("   REST API:  http://{}/api", addr);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("🛑 Received shutdown signal");

    // Cleanup
    info!("🧹 Shutting down...");
    if let Err(e) = server.stop().await {
        warn!("Server stop: {}", e);
    }
    hooks.abort();
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }
    info!("👋 LiftLive daemon stopped");

    Ok(())
}
