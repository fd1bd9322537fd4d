//! Tracker Binary Entry Point
//!
//! `tracker serve` runs the ingest server; `tracker emit` drives an event
//! collector from stdin, one `event tag...` line per event.
//! Core functionality is provided by the `tracker` library crate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracker::{
    Collector, CollectorConfig, StaticPage, StorageBuilder, StorageHandles, Visibility,
    config::{AppConfig, parse_duration},
    server::{AppState, create_router},
    storage::StorageAdmin,
};

/// Default ingest endpoint for `emit`.
const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8001/track";

/// Interval between retention cleanups.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Tracker - Usage Event Collection
#[derive(Parser, Debug)]
#[command(name = "tracker", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, env = "TRACKER_CONFIG", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingest server
    Serve(ServeArgs),
    /// Track events read from stdin and send them to an ingest endpoint
    Emit(EmitArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Server bind address (overrides config file)
    #[arg(long, env = "TRACKER_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "TRACKER_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, env = "TRACKER_DB_URL")]
    db_url: Option<String>,
}

#[derive(Args, Debug)]
struct EmitArgs {
    /// Ingest endpoint (overrides config file)
    #[arg(long, env = "TRACKER_ENDPOINT")]
    endpoint: Option<String>,

    /// Page URL attached to every event
    #[arg(long, default_value = "app://tracker/emit")]
    url: String,

    /// Page title attached to every event
    #[arg(long, default_value = "tracker emit")]
    title: String,

    /// Time to wait after end of input for the final flush to go out
    #[arg(long, default_value = "2s", value_parser = parse_duration)]
    linger: Duration,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tracker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    let config = match cli.config {
        Some(ref path) => {
            tracing::info!("Loading configuration from: {}", path);
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };

    match cli.command {
        Command::Serve(args) => serve(config, args).await,
        Command::Emit(args) => emit(config, args).await,
    }
}

/// Run the ingest server until a shutdown signal.
async fn serve(mut config: AppConfig, args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Tracker - ingest server");

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = args.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.server_port {
        config.server.port = port;
    }
    if let Some(url) = args.db_url {
        config.database.url = url;
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Database: {}",
        config.server.bind,
        config.server.port,
        config.database.url,
    );

    // Build storage layer
    let handles = StorageBuilder::new(&config.database.url)
        .channel_capacity(config.database.channel_capacity)
        .batch_size(config.database.batch_size)
        .batch_flush_interval(config.database.batch_flush_interval)
        .connect_retries(config.database.connect_retries)
        .build()
        .await?;

    tracing::info!("Storage initialized");

    if let Some(retention_days) = config.database.retention_days {
        tracing::info!(retention_days, "Scheduling retention cleanup");
        tokio::spawn(run_cleanup(handles.admin.clone(), retention_days));
    }

    // Create web server state
    let app_state = AppState {
        writer: handles.writer.clone(),
        reader: handles.reader.clone(),
    };

    // Build Axum router
    let app = create_router(app_state);

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Ingest server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(handles))
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Delete expired tracks periodically.
async fn run_cleanup(admin: StorageAdmin, retention_days: u32) {
    let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
    loop {
        ticker.tick().await;
        if let Err(e) = admin.cleanup(retention_days).await {
            tracing::warn!(error = %e, "Retention cleanup failed");
            break;
        }
    }
}

/// Track stdin lines as events, then flush as a closing page would.
async fn emit(config: AppConfig, args: EmitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut collector_config = config
        .client
        .unwrap_or_else(|| CollectorConfig::new(DEFAULT_ENDPOINT));
    if let Some(endpoint) = args.endpoint {
        collector_config.endpoint = endpoint;
    }

    tracing::info!(endpoint = %collector_config.endpoint, "Emitting events from stdin");

    let page = Arc::new(StaticPage::new(args.url, args.title));
    let collector = Collector::new(collector_config, page)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tracked = 0usize;
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        let Some(event) = words.next() else {
            continue;
        };
        let tags: Vec<&str> = words.collect();
        collector.track(event, &tags);
        tracked += 1;
    }

    tracing::info!(tracked, pending = collector.buffered_len(), "End of input");
    collector.visibility_changed(Visibility::Hidden);
    tokio::time::sleep(args.linger).await;

    Ok(())
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal(handles: StorageHandles) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!(
        dropped = handles.writer.dropped_tracks(),
        "Shutting down storage..."
    );
    if let Err(e) = handles.shutdown().await {
        tracing::error!("Failed to shutdown storage: {}", e);
    }
}
