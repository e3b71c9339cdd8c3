//! presswork-server - authoritative workflow service for one print shop
//!
//! Owns the activity and reprint stores, serves the department command
//! surface over HTTP and pushes workflow events to terminals over SSE.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use presswork_common::config::{
    default_config_path, load_toml_config, ConfigOverrides, ServerConfig, StorageBackend,
    TomlConfig,
};
use presswork_common::events::NotificationBus;
use presswork_server::store::Storage;
use presswork_server::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for presswork-server
#[derive(Parser, Debug)]
#[command(name = "presswork-server")]
#[command(about = "Print-shop workflow server")]
#[command(version)]
struct Args {
    /// Address to listen on (e.g. 127.0.0.1:5780)
    #[arg(short, long, env = "PRESSWORK_BIND_ADDR")]
    bind: Option<String>,

    /// Path to the TOML config file
    #[arg(short, long, env = "PRESSWORK_CONFIG")]
    config: Option<PathBuf>,

    /// Storage backend: sqlite or memory
    #[arg(long, env = "PRESSWORK_STORAGE")]
    storage: Option<StorageBackend>,

    /// SQLite database file
    #[arg(long, env = "PRESSWORK_DATABASE")]
    database: Option<PathBuf>,

    /// Default log level when RUST_LOG is not set
    #[arg(long, env = "PRESSWORK_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing exists; load problems are reported after init
    let config_path = args.config.clone().or_else(default_config_path);
    let (toml_config, config_error) = match config_path.as_deref() {
        Some(path) => match load_toml_config(path) {
            Ok(config) => (config, None),
            Err(e) => (TomlConfig::default(), Some(e)),
        },
        None => (TomlConfig::default(), None),
    };

    let config = ServerConfig::resolve(
        ConfigOverrides {
            bind_addr: args.bind,
            storage_backend: args.storage,
            database_path: args.database,
            log_level: args.log_level,
        },
        toml_config,
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Presswork server (presswork-server) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if let Some(e) = config_error {
        return Err(e).context("Failed to load configuration file");
    }
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let storage = Storage::open(&config)
        .await
        .context("Failed to open storage")?;

    let bus = NotificationBus::new();
    let state = AppState::new(storage, bus)
        .with_heartbeat(Duration::from_secs(config.heartbeat_secs));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("presswork-server listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);
    if config.storage_backend == StorageBackend::Memory {
        warn!("Memory storage selected: all activities are lost when the server stops");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
