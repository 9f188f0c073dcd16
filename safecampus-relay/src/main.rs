//! SafeCampus Relay - Main entry point
//!
//! Campus-safety incident-reporting and real-time alert relay server.
//! Boots the store, the shared caches, the session registry, and the
//! lifecycle controller, then serves the HTTP/SSE API until interrupted.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use safecampus_relay::api;
use safecampus_relay::config::Config;
use safecampus_relay::db;
use safecampus_relay::pipeline::AlertPipeline;
use safecampus_relay::registry::ConnectionRegistry;
use safecampus_relay::router::BroadcastRouter;
use safecampus_relay::scoring::{Classifier, HeuristicClassifier};
use safecampus_relay::state::SharedState;

/// Command-line arguments for safecampus-relay
#[derive(Parser, Debug)]
#[command(name = "safecampus-relay")]
#[command(about = "Campus safety incident-reporting and alert relay server")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SAFECAMPUS_PORT")]
    port: Option<u16>,

    /// SQLite database path
    #[arg(short, long, env = "SAFECAMPUS_DB_PATH")]
    db_path: Option<String>,

    /// Optional TOML configuration file
    #[arg(short, long, env = "SAFECAMPUS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "safecampus_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments; the file (if any) is overridden by
    // the flags/environment for the fields they carry
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path).context("Failed to load configuration file")?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }

    info!("Starting SafeCampus relay on port {}", config.port);
    info!("Database: {}", config.db_path);

    // An unreachable store at startup is fatal: better to die loudly than
    // run in a silently-failing mode
    let db_pool = db::connect(&config.db_path)
        .await
        .context("Failed to open report store")?;
    db::initialize_schema(&db_pool)
        .await
        .context("Failed to initialize report store schema")?;

    // Shared services: caches, event bus, session registry, lifecycle
    let state = Arc::new(SharedState::new(config.event_capacity));
    let router = BroadcastRouter::new(state.bus.clone());
    let registry = Arc::new(ConnectionRegistry::new());

    let reclassifier: Option<Arc<dyn Classifier>> = if config.deferred_rescore {
        Some(Arc::new(HeuristicClassifier))
    } else {
        None
    };
    let pipeline = Arc::new(AlertPipeline::new(
        db_pool.clone(),
        Arc::clone(&state),
        router.clone(),
        &config,
        reclassifier,
    ));
    info!("Lifecycle controller initialized");

    // Build the application router
    let ctx = api::AppContext {
        pipeline,
        registry,
        state: Arc::clone(&state),
        router,
        db_pool,
        config: Arc::new(config.clone()),
    };
    let app = api::create_router(ctx);

    // Create socket address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    // Create and run the server
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Drain the transient caches before exit
    state.clear().await;
    info!("Server shutdown complete");
    Ok(())
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
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
