//! audiokit - local audio toolkit service
//!
//! Fetches audio from video URLs (as polled background jobs), trims uploaded
//! audio and concatenates uploads. All media work is delegated to `yt-dlp`
//! and `ffmpeg`/`ffprobe`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audiokit::config::{CliOverrides, ServiceSettings};
use audiokit::tools::{FfmpegTranscoder, Transcoder, YtDlpFetcher};
use audiokit::AppState;
use audiokit_common::config::load_toml_config;

/// How long shutdown waits for cancelled fetch jobs to clean up
const JOB_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Command-line arguments for audiokit
#[derive(Parser, Debug)]
#[command(name = "audiokit")]
#[command(about = "Local audio fetch, trim and merge service")]
#[command(version)]
struct Args {
    /// Root folder holding uploads, outputs, downloads and scratch space
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "AUDIOKIT_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "AUDIOKIT_BIND_ADDRESS")]
    bind_address: Option<String>,

    /// Directory with the web UI, served for unmatched paths
    #[arg(long)]
    static_assets: Option<PathBuf>,

    /// TOML config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before logging exists; its own messages are dropped
    let toml_config = load_toml_config(args.config.as_deref(), "audiokit");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting audiokit v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let settings = ServiceSettings::resolve(
        CliOverrides {
            root_folder: args.root_folder,
            port: args.port,
            bind_address: args.bind_address,
            static_assets: args.static_assets,
        },
        toml_config,
    )
    .context("Invalid configuration")?;

    let layout = settings.storage_layout();
    layout
        .ensure_directories()
        .with_context(|| format!("Failed to create storage under {}", settings.root_folder.display()))?;
    info!("Root folder: {}", settings.root_folder.display());

    let transcoder = Arc::new(FfmpegTranscoder::new(
        settings.ffmpeg.clone(),
        settings.ffprobe.clone(),
        layout.temp.clone(),
    ));
    if !transcoder.is_available().await {
        warn!(
            "{} not found; fetch, trim and merge requests will fail until it is installed",
            settings.ffmpeg
        );
    }
    let fetcher = Arc::new(YtDlpFetcher::new(settings.yt_dlp.clone()));

    let shutdown = CancellationToken::new();
    let state = AppState::new(layout, transcoder, fetcher)
        .with_fetch_options(settings.fetch_options())
        .with_static_assets(settings.static_assets.clone())
        .with_shutdown(shutdown.clone());

    let app = audiokit::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(settings.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.listen_addr))?;
    info!("Listening on http://{}", settings.listen_addr);
    info!("Health check: http://{}/api/health", settings.listen_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await;

    // Scratch files are only removed by the jobs themselves
    if !state.drain_jobs(JOB_DRAIN_TIMEOUT).await {
        warn!(
            "Fetch jobs still running after {:?}; scratch files may remain",
            JOB_DRAIN_TIMEOUT
        );
    }
    served.context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C / SIGTERM, then cancel every in-flight fetch job
async fn shutdown_signal(shutdown: CancellationToken) {
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
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }

    shutdown.cancel();
}
