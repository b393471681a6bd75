//! Query API - Main entry point
//!
//! Read-only HTTP surface over the seedpipe records store. The ingest CLI
//! owns all writes; this process connects with mode=ro and serves lookups.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seedpipe_api::{build_router, AppState};
use seedpipe_common::config::{SeedpipeConfig, CONFIG_ENV_VAR};

/// Command-line arguments for seedpipe-api
#[derive(Parser, Debug)]
#[command(name = "seedpipe-api")]
#[command(about = "Read-only query API over the seedpipe store")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides configuration)
    #[arg(short, long, env = "SEEDPIPE_API_PORT")]
    port: Option<u16>,

    /// Configuration file path
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Database file path (overrides configuration)
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seedpipe_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config =
        SeedpipeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database.path = database;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    let rules = config.schema_rules();

    info!("Starting seedpipe query API v{}", env!("CARGO_PKG_VERSION"));
    info!("Database path: {}", config.database.path.display());

    let pool = connect_readonly(&config.database.path, config.database.max_connections).await?;

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let state = AppState::new(pool, rules, config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("seedpipe-api listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Connect to the store with mode=ro.
///
/// The ingest process may be writing concurrently, so the file is not
/// opened as immutable; WAL readers see the last committed state.
async fn connect_readonly(db_path: &Path, max_connections: u32) -> Result<SqlitePool> {
    if !db_path.exists() {
        anyhow::bail!(
            "Database not found: {}\nRun seedpipe-ingest init-db first.",
            db_path.display()
        );
    }

    let db_url = format!("sqlite://{}?mode=ro", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&db_url)
        .await
        .context("Failed to connect to database in read-only mode")?;

    Ok(pool)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
