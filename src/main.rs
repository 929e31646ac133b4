//! Hoststream Server
//!
//! Run with: cargo run -- --config hoststream.toml
//!
//! # Configuration
//!
//! Settings come from the config file (or the default search locations),
//! then environment variables, then command-line flags:
//! - `PORT`: Port to listen on (default: 8080)
//! - `HOSTSTREAM_HOST`: Host to bind to (default: 0.0.0.0)
//! - `HOSTSTREAM_LOG_LEVEL`, `HOSTSTREAM_LOG_FORMAT`: Logging
//! - `RUST_LOG`: Overrides the log filter entirely

use anyhow::Context;
use clap::Parser;
use hoststream::api::{serve, shutdown_signal, AppState};
use hoststream::config::{generate_default_config, Config, LoggingConfig};
use hoststream::metrics::SysinfoSampler;
use hoststream::scheduler::Scheduler;
use hoststream::stream::Hub;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "hoststream")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stream live host metrics to dashboards over Server-Sent Events")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print a default config file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    // Log settings live in the config, so report while loading it through a
    // default subscriber
    let config = tracing::subscriber::with_default(bootstrap_subscriber(), || load_config(&args))?;

    init_tracing(&config.logging);

    tracing::info!("Starting Hoststream v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        sample_interval_ms = config.stream.sample_interval_ms,
        heartbeat_interval_secs = config.stream.heartbeat_interval_secs,
        client_buffer = config.stream.client_buffer,
        "Stream settings"
    );

    let cancel = CancellationToken::new();

    let (hub, hub_task) = Hub::spawn(config.stream.hub(), cancel.clone());
    let scheduler = Scheduler::new(SysinfoSampler::new(), hub.clone(), config.stream.schedule())
        .start(cancel.clone());

    let signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal.cancel();
    });

    let served = serve(AppState::new(hub), &config.server, cancel.clone()).await;

    // Stop the timers and the hub whether the server exited cleanly or not
    cancel.cancel();
    if let Err(e) = scheduler.await {
        tracing::warn!(error = %e, "Scheduler task ended abnormally");
    }
    if let Err(e) = hub_task.await {
        tracing::warn!(error = %e, "Hub task ended abnormally");
    }

    served.context("HTTP server failed")?;
    tracing::info!("Hoststream stopped");
    Ok(())
}

/// File (or default search), environment, then command-line flags
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    Ok(config)
}

/// `RUST_LOG` wins over the configured level
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("hoststream={level},tower_http={level}").into())
}

fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(tracing_subscriber::fmt::layer())
}

fn init_tracing(logging: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(&logging.level));
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
