//! Merge API handler
//!
//! POST /api/merge/merge

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::post,
    Json, Router,
};

use audiokit_common::{time, uuid_utils};

use crate::api::clip::ArtifactResponse;
use crate::api::files::save_field;
use crate::error::{ApiError, ApiResult};
use crate::services::{naming::file_name_of, reserve_unique_path, ScratchFiles};
use crate::storage::allowed_extension;
use crate::tools::ToolError;
use crate::AppState;

/// Fewest inputs a merge accepts
pub const MIN_MERGE_FILES: usize = 2;

/// POST /api/merge/merge
///
/// Every `files` field with a non-empty name is staged, then the staged
/// inputs are concatenated in upload order. Staged inputs are removed on
/// every exit path.
pub async fn merge(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ArtifactResponse>> {
    let mut multipart =
        multipart.map_err(|e| ApiError::Validation(format!("Invalid upload: {}", e.body_text())))?;

    let mut staged = ScratchFiles::new();
    let mut seen_files_field = false;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("files") {
            continue;
        }
        seen_files_field = true;

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            continue;
        }
        let extension = allowed_extension(&filename).ok_or_else(|| {
            ApiError::Validation(format!("File {} has unsupported format", filename))
        })?;

        let path = state
            .layout
            .uploads
            .join(format!("merge_{}.{}", uuid_utils::generate(), extension));
        staged.track(path.clone());
        save_field(field, &path).await?;
    }

    if !seen_files_field {
        return Err(ApiError::Validation("No files provided".to_string()));
    }
    if staged.paths().len() < MIN_MERGE_FILES {
        return Err(ApiError::Validation(
            "Please upload at least 2 files".to_string(),
        ));
    }

    let output = reserve_unique_path(
        &state.layout.outputs,
        &format!("merged_{}", time::filename_tag()),
        "mp3",
    )
    .await?;
    let mut produced = ScratchFiles::new();
    produced.track(output.clone());

    state
        .transcoder
        .concatenate(staged.paths(), &output)
        .await
        .map_err(|e| match e {
            err @ ToolError::NotInstalled(_) => ApiError::DependencyUnavailable(err.to_string()),
            other => ApiError::ToolFailure(format!("Merge failed: {}", other.diagnostics())),
        })?;

    produced.keep(&output);
    let filename = file_name_of(&output);
    tracing::info!(inputs = staged.paths().len(), output = %filename, "Files merged");

    Ok(Json(ArtifactResponse {
        success: true,
        message: "Files merged successfully".to_string(),
        filename,
    }))
}

/// Build merge routes
pub fn merge_routes() -> Router<AppState> {
    Router::new().route("/api/merge/merge", post(merge))
}
