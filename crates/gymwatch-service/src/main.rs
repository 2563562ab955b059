//! Gymwatch Service - background poller and HTTP API.
//!
//! Run with: `cargo run -p gymwatch-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use gymwatch_core::{GeocodeApi, GeocodeClient, HttpTelemetryClient, RetryConfig, TelemetryApi};
use gymwatch_service::{AppState, Config, Poller, api};
use gymwatch_store::{CacheStore, SqliteBackend};

/// Gymwatch Service - background poller and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "gymwatch-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Cache database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Disable the background poller (API only mode).
    #[arg(long)]
    no_poller: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gymwatch_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load_validated(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    // Override config with CLI args
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }

    // Open the cache store
    info!("Opening cache database at {:?}", config.storage.path);
    let backend = SqliteBackend::open(&config.storage.path)?;
    let cache = CacheStore::new(Arc::new(backend));

    // Construct the upstream collaborators once; everything downstream
    // receives them by reference.
    let telemetry: Arc<dyn TelemetryApi> = Arc::new(HttpTelemetryClient::with_config(
        &config.telemetry.base_url,
        config.telemetry.timeout(),
        RetryConfig::new(config.telemetry.max_retries),
    )?);

    let geocoder: Option<Arc<dyn GeocodeApi>> = if config.geocode.api_key.is_empty() {
        info!("Geocoding disabled (no API key configured)");
        None
    } else {
        Some(Arc::new(GeocodeClient::new(
            &config.geocode.endpoint,
            &config.geocode.api_key,
        )?))
    };

    // Create application state
    let state = AppState::new(cache, config.clone(), telemetry, geocoder);

    // Start the background poller
    if !args.no_poller {
        Poller::new(Arc::clone(&state)).start().await;
    } else {
        info!("Background poller disabled");
    }

    // Build the router
    let app = Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
