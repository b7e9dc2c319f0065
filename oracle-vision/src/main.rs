//! oracle-vision - Fire image and vision image microservice
//!
//! - Default port: 5730 (127.0.0.1)
//! - Root folder: CLI → ORACLE_ROOT_FOLDER → TOML → OS default
//! - Config: `<config dir>/oracle/oracle-vision.toml` unless `--config` is given

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use oracle_common::config::{self, RootFolderInitializer, RootFolderResolver};
use oracle_common::events::EventBus;

use oracle_vision::services::{
    ArtifactStore, JobTracker, OpenAiImageClient, SqliteReadingAttacher, TrackerConfig,
};
use oracle_vision::AppState;

const MODULE_NAME: &str = "oracle-vision";
const DEFAULT_PORT: u16 = 5730;

/// Command-line arguments for oracle-vision
#[derive(Parser, Debug)]
#[command(name = "oracle-vision")]
#[command(about = "Fire image capture and vision image generation for oracle readings")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "ORACLE_PORT")]
    port: Option<u16>,

    /// Root folder holding the database and stored artifacts
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "ORACLE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| config::default_config_path(MODULE_NAME));
    let toml_config = match &config_path {
        Some(path) => config::load_toml_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => config::TomlConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml_config.logging.level)),
        )
        .init();

    // Build identification first, before any slow startup step
    info!(
        "Starting oracle-vision v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) if path.exists() => info!("Config: {}", path.display()),
        Some(path) => info!("Config: {} (not present, using defaults)", path.display()),
        None => warn!("No config directory available, using defaults"),
    }

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder)
        .with_toml(&toml_config)
        .resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = oracle_vision::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);

    let artifacts = Arc::new(ArtifactStore::new(initializer.artifacts_path()));
    info!("Artifacts: {}", artifacts.root().display());

    let generator = Arc::new(
        OpenAiImageClient::new(&toml_config.provider).context("Failed to create image client")?,
    );
    let attacher = Arc::new(SqliteReadingAttacher::new(db_pool.clone()));
    let tracker_config = TrackerConfig::from_config(&toml_config.jobs, &toml_config.provider);
    info!(
        max_concurrent = tracker_config.max_concurrent,
        call_timeout_secs = tracker_config.call_timeout.as_secs(),
        retention_secs = tracker_config.retention.as_secs(),
        "Vision generation configured"
    );
    let tracker = Arc::new(JobTracker::new(
        Arc::clone(&artifacts),
        generator,
        attacher,
        event_bus.clone(),
        tracker_config,
    ));
    let _sweeper = tracker.spawn_sweeper(oracle_common::time::secs_to_duration(
        toml_config.jobs.sweep_interval_seconds,
    ));

    let state = AppState::new(db_pool, event_bus, artifacts, tracker);
    let app = oracle_vision::build_router(state);

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
