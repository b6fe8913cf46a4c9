//! File transfer helpers and output artifact endpoints
//!
//! GET /api/download/:filename, POST /api/cleanup-output/:filename

use std::path::Path;

use axum::{
    body::Body,
    extract::{multipart::Field, Path as UrlPath, State},
    http::header,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult};
use crate::storage::resolve_within;
use crate::AppState;

/// Every artifact this service produces is MP3
pub const AUDIO_MPEG: &str = "audio/mpeg";

/// Bare success acknowledgement
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Stream a file as a download attachment
pub(crate) async fn attachment(path: &Path, download_name: &str) -> ApiResult<Response> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("File not found".to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(ApiError::NotFound("File not found".to_string()));
    }

    Response::builder()
        .header(header::CONTENT_TYPE, AUDIO_MPEG)
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::CONTENT_DISPOSITION, content_disposition(download_name))
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name
pub fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

/// Write a multipart field to `path` chunk by chunk
///
/// Returns the number of bytes written.
pub(crate) async fn save_field(mut field: Field<'_>, path: &Path) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Remove a file, mapping absence to 404
pub(crate) async fn remove_existing(path: &Path) -> ApiResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::NotFound("File not found".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /api/download/:filename
pub async fn download_output(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> ApiResult<Response> {
    let path = resolve_within(&state.layout.outputs, &filename)?;
    tracing::debug!(file = %filename, "Serving output artifact");
    attachment(&path, &filename).await
}

/// POST /api/cleanup-output/:filename
pub async fn cleanup_output(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> ApiResult<Json<SuccessResponse>> {
    let path = resolve_within(&state.layout.outputs, &filename)?;
    remove_existing(&path).await?;
    tracing::info!(file = %filename, "Output artifact removed");
    Ok(Json(SuccessResponse { success: true }))
}

/// Build output artifact routes
pub fn output_routes() -> Router<AppState> {
    Router::new()
        .route("/api/download/:filename", get(download_output))
        .route("/api/cleanup-output/:filename", post(cleanup_output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("merged_20240101_120000.mp3"),
            "attachment; filename=\"merged_20240101_120000.mp3\"; filename*=UTF-8''merged_20240101_120000.mp3"
        );
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        let value = content_disposition("Café Song.mp3");
        assert!(value.starts_with("attachment; filename=\"Caf_ Song.mp3\""));
        assert!(value.ends_with("filename*=UTF-8''Caf%C3%A9%20Song.mp3"));
    }

    #[tokio::test]
    async fn test_remove_existing_missing_is_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let err = remove_existing(&temp.path().join("nope.mp3")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
