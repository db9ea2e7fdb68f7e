//! # hive-coord
//!
//! Coordinator server binary — wires the store, event bus, liveness
//! monitor, and HTTP surface together and runs until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hive_core::{CoreEvent, EventType};
use hive_server::{Coordinator, CoordConfig, EventBus, LivenessMonitor, ShutdownCoordinator};
use hive_store::{MemoryStore, PluginStore, SqliteStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Hive coordinator server.
#[derive(Parser, Debug)]
#[command(name = "hive-coord", about = "Hive plugin coordinator")]
struct Cli {
    /// Host to bind (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides config; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the SQLite database. Omit (and leave config empty) to keep
    /// state in memory.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        CoordConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(db_path) = cli.db_path {
        config.db_path = Some(db_path);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let store: Arc<dyn PluginStore> = match &config.db_path {
        Some(path) => {
            info!(path = %path.display(), "opening sqlite store");
            Arc::new(SqliteStore::open(path).context("failed to open database")?)
        }
        None => {
            info!("using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let bus = Arc::new(EventBus::new());
    let relay = bus.start();

    let shutdown = ShutdownCoordinator::new();
    let monitor = LivenessMonitor::new(store.clone(), &config.liveness);
    let monitor_task = tokio::spawn(monitor.run(shutdown.token()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let coordinator = Arc::new(Coordinator::new(store, bus.clone(), config));
    let app = hive_server::router(coordinator.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "coordinator listening");

    let serve_token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                () = serve_token.cancelled() => {}
            }
        })
        .await
        .context("server error")?;

    info!("shutting down");
    coordinator.broadcast(CoreEvent::new(EventType::Shutdown, "system shutting down"));
    shutdown.graceful_shutdown(vec![monitor_task], None).await;
    bus.stop().await;
    let _ = relay.await;

    Ok(())
}
