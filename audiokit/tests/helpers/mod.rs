//! Test Helper Utilities
//!
//! Fake tool adapters and request helpers shared by the audiokit
//! integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

use audiokit::storage::StorageLayout;
use audiokit::tools::{FetchProgress, FetchRequest, FetchedMedia, MediaFetcher, ToolError, Transcoder};
use audiokit::AppState;

pub const BOUNDARY: &str = "audiokit-test-boundary";

/// One recorded `trim` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct TrimCall {
    pub input: PathBuf,
    pub start: f64,
    pub duration: f64,
    pub output: PathBuf,
}

/// Transcoder that records calls and writes placeholder outputs
#[derive(Debug, Default)]
pub struct FakeTranscoder {
    pub missing: bool,
    /// Duration every probe reports; `None` makes files unreadable
    pub duration: Option<f64>,
    /// Stderr of a simulated non-zero exit
    pub failure: Option<String>,
    pub trims: Mutex<Vec<TrimCall>>,
    pub concats: Mutex<Vec<Vec<PathBuf>>>,
}

impl FakeTranscoder {
    pub fn working() -> Self {
        Self {
            duration: Some(42.5),
            ..Self::default()
        }
    }

    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    pub fn failing(stderr: &str) -> Self {
        Self {
            duration: Some(42.5),
            failure: Some(stderr.to_string()),
            ..Self::default()
        }
    }

    fn outcome(&self, output: &Path) -> Result<(), ToolError> {
        if self.missing {
            return Err(ToolError::NotInstalled("ffmpeg".into()));
        }
        if let Some(stderr) = &self.failure {
            return Err(ToolError::Failed {
                tool: "ffmpeg".into(),
                code: Some(1),
                stderr: stderr.clone(),
            });
        }
        std::fs::write(output, b"ID3 fake mp3")?;
        Ok(())
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn is_available(&self) -> bool {
        !self.missing
    }

    async fn probe_duration(&self, _path: &Path) -> Option<f64> {
        self.duration
    }

    async fn trim(
        &self,
        input: &Path,
        start: f64,
        duration: f64,
        output: &Path,
    ) -> Result<(), ToolError> {
        self.trims.lock().unwrap().push(TrimCall {
            input: input.to_path_buf(),
            start,
            duration,
            output: output.to_path_buf(),
        });
        self.outcome(output)
    }

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        // Inputs must still exist while the tool runs
        assert!(inputs.iter().all(|p| p.exists()), "concat input missing");
        self.concats.lock().unwrap().push(inputs.to_vec());
        self.outcome(output)
    }
}

/// Fetcher that replays scripted progress and writes scratch files
pub struct FakeFetcher {
    pub title: String,
    pub events: Vec<FetchProgress>,
    /// Stderr of a simulated failure, reported after the events
    pub failure: Option<String>,
    /// Skip writing `<job_id>.mp3` while still reporting success
    pub skip_artifact: bool,
    /// When set, each event waits for one permit before it is sent
    pub gate: Option<Arc<Semaphore>>,
}

impl FakeFetcher {
    pub fn succeeding(title: &str) -> Self {
        Self {
            title: title.to_string(),
            events: vec![
                FetchProgress::downloading(" 12.5%"),
                FetchProgress::downloading("100.0%"),
                FetchProgress::PostProcessing,
            ],
            failure: None,
            skip_artifact: false,
            gate: None,
        }
    }

    pub fn failing(stderr: &str) -> Self {
        Self {
            failure: Some(stderr.to_string()),
            ..Self::succeeding("unused")
        }
    }

    pub fn gated(title: &str, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::succeeding(title)
        }
    }

    async fn wait_gate(&self, cancel: &CancellationToken) -> Result<(), ToolError> {
        let Some(gate) = &self.gate else {
            return Ok(());
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(ToolError::Cancelled("yt-dlp".into())),
            permit = gate.acquire() => {
                permit.expect("gate closed").forget();
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch_audio(
        &self,
        request: &FetchRequest,
        progress: mpsc::UnboundedSender<FetchProgress>,
        cancel: CancellationToken,
    ) -> Result<FetchedMedia, ToolError> {
        // Partial download left behind the way the real tool does
        std::fs::write(
            request.scratch_dir.join(format!("{}.webm.part", request.job_id)),
            b"partial",
        )?;

        for event in &self.events {
            self.wait_gate(&cancel).await?;
            let _ = progress.send(event.clone());
        }
        self.wait_gate(&cancel).await?;

        if let Some(stderr) = &self.failure {
            return Err(ToolError::Failed {
                tool: "yt-dlp".into(),
                code: Some(1),
                stderr: stderr.clone(),
            });
        }
        if !self.skip_artifact {
            std::fs::write(request.expected_artifact(), b"ID3 fetched mp3")?;
        }
        Ok(FetchedMedia {
            title: self.title.clone(),
        })
    }
}

/// App state rooted in a fresh temporary directory
pub fn test_state(transcoder: Arc<FakeTranscoder>, fetcher: Arc<FakeFetcher>) -> (AppState, TempDir) {
    let root = tempfile::tempdir().unwrap();
    let layout = StorageLayout::from_root(root.path());
    layout.ensure_directories().unwrap();
    (AppState::new(layout, transcoder, fetcher), root)
}

/// Send one request, returning status and parsed JSON body (Null if not JSON)
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Multipart request with one file part per `(field, filename, content)`
pub fn post_multipart(uri: &str, parts: &[(&str, &str, &str)]) -> Request<Body> {
    let mut body = Vec::new();
    for (field, filename, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Poll the status endpoint until `done` accepts the record
pub async fn poll_status<F>(app: &Router, download_id: &str, done: F) -> Value
where
    F: Fn(&Value) -> bool,
{
    let uri = format!("/api/youtube/status/{}", download_id);
    for _ in 0..200 {
        let (status, body) = send(app, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        if done(&body) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("status for {} never reached the expected state", download_id);
}

/// Names of the files currently in `dir`
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
