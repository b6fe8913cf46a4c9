//! Fetch job API handlers
//!
//! POST /api/youtube/download, GET /api/youtube/status/:id,
//! GET /api/youtube/download/:filename

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use audiokit_common::uuid_utils;

use crate::api::files::attachment;
use crate::error::{ApiError, ApiResult};
use crate::models::DownloadJob;
use crate::services::FetchWorker;
use crate::storage::resolve_within;
use crate::AppState;

/// POST /api/youtube/download request
#[derive(Debug, Deserialize)]
pub struct StartDownloadRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// POST /api/youtube/download response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDownloadResponse {
    pub download_id: Uuid,
}

/// POST /api/youtube/download
///
/// Registers a queued job and returns its id immediately; the fetch runs in a
/// background task.
pub async fn start_download(
    State(state): State<AppState>,
    payload: Result<Json<StartDownloadRequest>, JsonRejection>,
) -> ApiResult<Json<StartDownloadResponse>> {
    let Json(request) =
        payload.map_err(|e| ApiError::Validation(format!("Invalid request body: {}", e.body_text())))?;

    let url = request
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::Validation("No URL provided".to_string()))?
        .to_string();

    // Fail fast instead of letting the job die inside the worker
    if !state.transcoder.is_available().await {
        return Err(ApiError::DependencyUnavailable(
            "FFmpeg not installed. Please install FFmpeg to use this service.".to_string(),
        ));
    }

    let job_id = uuid_utils::generate();
    state.jobs.create(job_id).await?;

    FetchWorker::new(
        state.jobs.clone(),
        state.fetcher.clone(),
        state.layout.clone(),
        state.fetch_options.clone(),
    )
    .spawn(&state.tasks, url.clone(), job_id, state.shutdown.child_token());

    tracing::info!(job_id = %job_id, url = %url, "Download job accepted");

    Ok(Json(StartDownloadResponse {
        download_id: job_id,
    }))
}

/// GET /api/youtube/status/:download_id
pub async fn download_status(
    State(state): State<AppState>,
    Path(download_id): Path<String>,
) -> ApiResult<Json<DownloadJob>> {
    let id = uuid_utils::parse(&download_id)
        .map_err(|_| ApiError::NotFound("Download not found".to_string()))?;
    Ok(Json(state.jobs.get(id).await?))
}

/// GET /api/youtube/download/:filename
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let path = resolve_within(&state.layout.downloads, &filename)?;
    attachment(&path, &filename).await
}

/// Build fetch job routes
pub fn youtube_routes() -> Router<AppState> {
    Router::new()
        .route("/api/youtube/download", post(start_download))
        .route("/api/youtube/status/:download_id", get(download_status))
        .route("/api/youtube/download/:filename", get(download_file))
}
