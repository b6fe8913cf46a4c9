//! audiokit library interface
//!
//! Exposes `AppState` and `build_router` for the binary and for integration
//! tests.

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod storage;
pub mod tools;

pub use crate::error::{ApiError, ApiResult};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::jobs::JobRegistry;
use crate::storage::StorageLayout;
use crate::tools::{FetchOptions, MediaFetcher, Transcoder};

/// Maximum accepted request body (uploads)
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Download job records
    pub jobs: JobRegistry,
    pub layout: Arc<StorageLayout>,
    pub transcoder: Arc<dyn Transcoder>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub fetch_options: FetchOptions,
    /// Root token; every fetch job runs under a child of it
    pub shutdown: CancellationToken,
    /// Running fetch jobs, awaited on shutdown
    pub tasks: TaskTracker,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Optional web UI directory served for unmatched paths
    pub static_assets: Option<PathBuf>,
}

impl AppState {
    pub fn new(
        layout: StorageLayout,
        transcoder: Arc<dyn Transcoder>,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Self {
        Self {
            jobs: JobRegistry::new(),
            layout: Arc::new(layout),
            transcoder,
            fetcher,
            fetch_options: FetchOptions::default(),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            startup_time: Utc::now(),
            static_assets: None,
        }
    }

    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.fetch_options = options;
        self
    }

    pub fn with_static_assets(mut self, dir: Option<PathBuf>) -> Self {
        self.static_assets = dir;
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Cancel every fetch job and wait for them to finish their cleanup
    ///
    /// Returns false if jobs were still running when `grace` ran out.
    pub async fn drain_jobs(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        self.tasks.close();
        tokio::time::timeout(grace, self.tasks.wait()).await.is_ok()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let static_assets = state.static_assets.clone();

    let router = Router::new()
        .merge(api::health_routes())
        .merge(api::youtube_routes())
        .merge(api::clip_routes())
        .merge(api::merge_routes())
        .merge(api::output_routes())
        .with_state(state);

    let router = match static_assets {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
