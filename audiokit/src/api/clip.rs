//! Upload and trim API handlers
//!
//! POST /api/clip/upload, POST /api/clip/clip,
//! POST /api/clip/cleanup/:file_id/:extension

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use audiokit_common::{time, uuid_utils};

use crate::api::files::{remove_existing, save_field, SuccessResponse};
use crate::error::{ApiError, ApiResult};
use crate::services::{naming::file_name_of, reserve_unique_path, ScratchFiles};
use crate::storage::{allowed_extension, ALLOWED_EXTENSIONS};
use crate::tools::ToolError;
use crate::AppState;

/// POST /api/clip/upload response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub file_id: Uuid,
    /// Name the client uploaded the file under
    pub filename: String,
    /// Seconds, as reported by the probe
    pub duration: f64,
    pub extension: String,
}

/// POST /api/clip/clip request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRequest {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub end_time: f64,
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    "mp3".to_string()
}

/// Trim / merge result
#[derive(Debug, Serialize)]
pub struct ArtifactResponse {
    pub success: bool,
    pub message: String,
    pub filename: String,
}

/// Validated trim window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimWindow {
    pub start: f64,
    pub duration: f64,
}

impl TrimWindow {
    /// Requires `0 <= start < end`
    pub fn new(start: f64, end: f64) -> ApiResult<Self> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
            return Err(ApiError::Validation("Invalid time range".to_string()));
        }
        Ok(Self {
            start,
            duration: end - start,
        })
    }
}

fn unsupported_format() -> ApiError {
    ApiError::Validation(format!(
        "Unsupported file format. Allowed: {}",
        ALLOWED_EXTENSIONS.join(", ")
    ))
}

/// POST /api/clip/upload
///
/// Stages the `file` field under a fresh id and probes its duration. The
/// staged copy is removed again if anything fails.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, axum::extract::multipart::MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart =
        multipart.map_err(|e| ApiError::Validation(format!("Invalid upload: {}", e.body_text())))?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(ApiError::Validation("No file selected".to_string()));
        }
        let extension = allowed_extension(&filename).ok_or_else(unsupported_format)?;

        let file_id = uuid_utils::generate();
        let path = state.layout.upload_path(&file_id, &extension);
        let mut scratch = ScratchFiles::new();
        scratch.track(path.clone());

        let bytes = save_field(field, &path).await?;
        let duration = state.transcoder.probe_duration(&path).await.ok_or_else(|| {
            ApiError::Validation("Could not read audio file duration".to_string())
        })?;

        scratch.keep(&path);
        tracing::info!(file_id = %file_id, file = %filename, bytes, duration, "Upload staged");

        return Ok(Json(UploadResponse {
            success: true,
            file_id,
            filename,
            duration,
            extension,
        }));
    }

    Err(ApiError::Validation("No file provided".to_string()))
}

/// POST /api/clip/clip
pub async fn clip(
    State(state): State<AppState>,
    payload: Result<Json<ClipRequest>, JsonRejection>,
) -> ApiResult<Json<ArtifactResponse>> {
    let Json(request) =
        payload.map_err(|e| ApiError::Validation(format!("Invalid request body: {}", e.body_text())))?;

    let file_id = request
        .file_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("File ID is required".to_string()))?;
    let file_id = uuid_utils::parse(file_id.trim())
        .map_err(|_| ApiError::Validation("Invalid file ID".to_string()))?;

    let window = TrimWindow::new(request.start_time, request.end_time)?;

    let extension = request.extension.to_ascii_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(unsupported_format());
    }

    let input = state.layout.upload_path(&file_id, &extension);
    if !tokio::fs::try_exists(&input).await.unwrap_or(false) {
        return Err(ApiError::NotFound("File not found".to_string()));
    }

    let output = reserve_unique_path(
        &state.layout.outputs,
        &format!("clipped_{}", time::filename_tag()),
        "mp3",
    )
    .await?;
    let mut scratch = ScratchFiles::new();
    scratch.track(output.clone());

    state
        .transcoder
        .trim(&input, window.start, window.duration, &output)
        .await
        .map_err(|e| match e {
            err @ ToolError::NotInstalled(_) => ApiError::DependencyUnavailable(err.to_string()),
            other => ApiError::ToolFailure(format!("Clipping failed: {}", other.diagnostics())),
        })?;

    scratch.keep(&output);
    let filename = file_name_of(&output);
    tracing::info!(
        file_id = %file_id,
        start = window.start,
        duration = window.duration,
        output = %filename,
        "Audio clipped"
    );

    Ok(Json(ArtifactResponse {
        success: true,
        message: "Audio clipped successfully".to_string(),
        filename,
    }))
}

/// POST /api/clip/cleanup/:file_id/:extension
pub async fn cleanup_upload(
    State(state): State<AppState>,
    Path((file_id, extension)): Path<(String, String)>,
) -> ApiResult<Json<SuccessResponse>> {
    // Anything that could not have been produced by upload is simply absent
    let not_found = || ApiError::NotFound("File not found".to_string());
    let file_id = uuid_utils::parse(&file_id).map_err(|_| not_found())?;
    let extension = extension.to_ascii_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(not_found());
    }

    remove_existing(&state.layout.upload_path(&file_id, &extension)).await?;
    tracing::debug!(file_id = %file_id, "Staged upload removed");
    Ok(Json(SuccessResponse { success: true }))
}

/// Build upload/trim routes
pub fn clip_routes() -> Router<AppState> {
    Router::new()
        .route("/api/clip/upload", post(upload))
        .route("/api/clip/clip", post(clip))
        .route("/api/clip/cleanup/:file_id/:extension", post(cleanup_upload))
}
