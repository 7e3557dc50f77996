//! Sheetpress server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use sheetpress_core::config::AppConfig;
use sheetpress_extract::Extractor;
use sheetpress_server::{create_router, AppState, WorkerPool};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sheetpress - a PDF to spreadsheet conversion service
#[derive(Parser, Debug)]
#[command(name = "sheetpressd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "SHEETPRESS_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Startup banner
    tracing::info!("Sheetpress v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let has_env_config = std::env::vars()
        .any(|(key, _)| key.starts_with("SHEETPRESS_") && key != "SHEETPRESS_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: sheetpressd --config /path/to/config.toml\n  \
             2. Environment variables: SHEETPRESS_SERVER__BIND=0.0.0.0:8080 \
             SHEETPRESS_BILLING__WEBHOOK_SECRET_HASH=YOUR_SECRET_HASH sheetpressd\n\n\
             See config/server.example.toml for example configuration."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("SHEETPRESS_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    if let Err(error) = config.validate() {
        anyhow::bail!("invalid configuration: {error}");
    }

    // Register Prometheus metrics
    sheetpress_server::metrics::register_metrics();

    // Initialize storage backend and verify connectivity before accepting
    // requests; the server must not report healthy with unreachable storage.
    let storage = sheetpress_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    // Initialize metadata store (runs migrations)
    let metadata = sheetpress_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    // Build the extraction engine
    let extractor = Arc::new(Extractor::from_config(&config.worker.extraction));

    // Create application state
    let state = AppState::new(config.clone(), storage, metadata, extractor);

    // Requeue processing jobs orphaned by a previous instance before any
    // worker starts.
    sheetpress_server::worker::recover_orphaned_jobs(&state)
        .await
        .context("failed to recover orphaned jobs")?;

    // Spawn conversion workers and the supervising sweep
    let _workers = WorkerPool::spawn(state.clone());

    // Create router
    let app = create_router(state);

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
