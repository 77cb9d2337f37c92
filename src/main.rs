//! CLI entry point for the live vehicle map backend.
//!
//! `serve` polls the agency's GTFS-RT feed and exposes the vehicles and the
//! static route shapes as GeoJSON; `dump` and `route` are one-shot helpers
//! for inspecting the upstream feed and the static dataset.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gtfs_rt_map::{
    fetch::{FeedKind, RealtimeFeedClient},
    output::{print_json, write_json},
    poller::{FeedPoller, SnapshotStore},
    projector::route_feature_collection,
    schedule::ScheduleIndex,
    server::{self, AppState},
};
use reqwest::Url;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_map")]
#[command(about = "Republishes a GTFS-RT vehicle feed as GeoJSON for a live map", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Upstream feed location and credentials.
#[derive(Args)]
struct FeedArgs {
    /// Base GTFS-RT endpoint; the vehicle-positions or trip-updates URL is derived from it
    #[arg(long, env = "FEED_URL")]
    feed_url: Url,

    /// Key sent in the `apiKey` header
    #[arg(long, env = "FEED_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Upper bound on a single feed request, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 10)]
    fetch_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the feed and serve vehicles and route shapes over HTTP
    Serve {
        #[command(flatten)]
        feed: FeedArgs,

        /// Directory holding the static trips.txt and shapes.txt
        #[arg(long, env = "GTFS_DIR", default_value = "gtfs")]
        gtfs_dir: PathBuf,

        /// Port to run the HTTP server on
        #[arg(short, long, env = "SERVER_PORT", default_value_t = 8080)]
        port: u16,

        /// Seconds between feed polls
        #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 5)]
        poll_interval_secs: u64,
    },
    /// Fetch a feed once and log it as JSON
    Dump {
        #[command(flatten)]
        feed: FeedArgs,

        /// Which of the agency's feeds to fetch
        #[arg(short, long, value_enum, default_value_t = FeedKind::VehiclePositions)]
        kind: FeedKind,
    },
    /// Print the GeoJSON shape of a route from the static dataset
    Route {
        route_id: String,

        /// Preferred direction; falls back to the first available one
        #[arg(short, long)]
        direction: Option<String>,

        #[arg(long, env = "GTFS_DIR", default_value = "gtfs")]
        gtfs_dir: PathBuf,

        /// Write to this file instead of the log
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _log_guard = init_tracing()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            feed,
            gtfs_dir,
            port,
            poll_interval_secs,
        } => serve(feed, &gtfs_dir, port, Duration::from_secs(poll_interval_secs)).await?,
        Commands::Dump { feed, kind } => {
            let client = RealtimeFeedClient::with_api_key(
                kind.endpoint(&feed.feed_url),
                &feed.api_key,
                Duration::from_secs(feed.fetch_timeout_secs),
            )?;
            let message = client.fetch_feed().await?;
            info!(
                endpoint = %client.endpoint(),
                entity_count = message.entity.len(),
                "Feed fetched"
            );
            print_json(&message)?;
        }
        Commands::Route {
            route_id,
            direction,
            gtfs_dir,
            output,
        } => {
            let index = ScheduleIndex::load(&gtfs_dir);
            let fc = route_feature_collection(&index, &route_id, direction.as_deref());
            if fc.features.is_empty() {
                warn!(route_id = %route_id, "No shape available for route");
            }
            match output {
                Some(path) => write_json(&path, &fc)?,
                None => print_json(&fc)?,
            }
        }
    }

    Ok(())
}

/// Logging setup: colored stderr + JSON rolling log file.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing() -> Result<WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_rt_map.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_map.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(file_guard)
}

/// Builds the index, starts the poller and the HTTP server, and runs until
/// Ctrl-C. Only a failure to bind the listener is fatal at startup.
#[tracing::instrument(skip(feed, gtfs_dir), fields(gtfs_dir = %gtfs_dir.display()))]
async fn serve(feed: FeedArgs, gtfs_dir: &Path, port: u16, poll_interval: Duration) -> Result<()> {
    let index = Arc::new(ScheduleIndex::load(gtfs_dir));

    let fetch_timeout = Duration::from_secs(feed.fetch_timeout_secs);
    let endpoint = FeedKind::VehiclePositions.endpoint(&feed.feed_url);
    let client = RealtimeFeedClient::with_api_key(endpoint, &feed.api_key, fetch_timeout)?;

    let snapshots = SnapshotStore::new();
    let poller = Arc::new(
        FeedPoller::new(client, snapshots.clone())
            .with_interval(poll_interval)
            .with_fetch_timeout(fetch_timeout),
    );

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind HTTP listener on port {port}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller_task = tokio::spawn({
        let poller = poller.clone();
        let shutdown = shutdown_rx.clone();
        async move { poller.run(shutdown).await }
    });

    let state = AppState { index, snapshots };
    let mut server_task = tokio::spawn(server::serve(listener, state, shutdown_rx));

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Shutdown signal received");
        }
        res = &mut server_task => {
            error!("HTTP server exited unexpectedly");
            let _ = shutdown_tx.send(true);
            poller_task.await?;
            res??;
            anyhow::bail!("HTTP server stopped without a shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    poller_task.await?;
    server_task.await??;

    info!("Shutdown complete");
    Ok(())
}
