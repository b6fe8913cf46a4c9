//! External tool adapters
//!
//! Wraps the command-line transcoder (`ffmpeg`/`ffprobe`) and media fetcher
//! (`yt-dlp`). Every call is a subprocess invocation with captured output and
//! exit status; traits sit at the seam so workers and handlers can be driven
//! by fakes in tests.

pub mod ffmpeg;
pub mod progress;
pub mod ytdlp;

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use ffmpeg::FfmpegTranscoder;
pub use progress::FetchProgress;
pub use ytdlp::YtDlpFetcher;

/// Fixed encoder bitrate for every MP3 this service produces
pub const MP3_BITRATE: &str = "192k";

/// External tool errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// Executable not found in PATH
    #[error("{0} is not installed or not in PATH")]
    NotInstalled(String),

    /// Failed to spawn the executable
    #[error("Failed to execute {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Tool ran and exited non-zero
    #[error("{tool} failed (exit code {code:?}): {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Run aborted through its cancellation token
    #[error("{0} was cancelled")]
    Cancelled(String),

    /// I/O error around the invocation (manifests, pipes)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Diagnostic text suitable for user-facing messages
    ///
    /// For a failed run this is the tool's own stderr; otherwise the error
    /// description.
    pub fn diagnostics(&self) -> String {
        match self {
            ToolError::Failed { tool, stderr, .. } if stderr.trim().is_empty() => {
                format!("{} error", tool)
            }
            ToolError::Failed { stderr, .. } => stderr.trim().to_string(),
            other => other.to_string(),
        }
    }
}

/// Fixed parameters handed to the fetcher
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Format selection preference
    pub format: String,
    /// Target audio codec
    pub audio_codec: String,
    /// Target audio quality (bitrate)
    pub audio_quality: String,
    /// Timeout on socket operations
    pub socket_timeout: Duration,
    /// Only ever fetch the single linked item
    pub no_playlist: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            format: "bestaudio/best".to_string(),
            audio_codec: "mp3".to_string(),
            audio_quality: "192K".to_string(),
            socket_timeout: Duration::from_secs(30),
            no_playlist: true,
        }
    }
}

/// One fetch-and-extract invocation
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub job_id: Uuid,
    /// Directory the fetcher writes `<job_id>.*` files into
    pub scratch_dir: PathBuf,
    pub options: FetchOptions,
}

impl FetchRequest {
    /// Output template passed to the fetcher (`<scratch>/<job_id>.%(ext)s`)
    pub fn output_template(&self) -> PathBuf {
        self.scratch_dir.join(format!("{}.%(ext)s", self.job_id))
    }

    /// Where the extracted audio is expected once the fetcher succeeds
    pub fn expected_artifact(&self) -> PathBuf {
        self.scratch_dir
            .join(format!("{}.{}", self.job_id, self.options.audio_codec))
    }
}

/// Metadata returned by a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub title: String,
}

/// Network fetch + audio extraction
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch `request.url` and extract audio into the scratch directory
    ///
    /// Progress is reported on `progress` in the order the tool emits it.
    /// Returns once the tool has exited.
    async fn fetch_audio(
        &self,
        request: &FetchRequest,
        progress: mpsc::UnboundedSender<FetchProgress>,
        cancel: CancellationToken,
    ) -> Result<FetchedMedia, ToolError>;
}

/// Probe/trim/concatenate via the command-line transcoder
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Whether the transcoder executable can be invoked
    async fn is_available(&self) -> bool;

    /// Media duration in seconds; `None` on any failure
    async fn probe_duration(&self, path: &Path) -> Option<f64>;

    /// Cut `duration` seconds starting at `start` into an MP3
    async fn trim(
        &self,
        input: &Path,
        start: f64,
        duration: f64,
        output: &Path,
    ) -> Result<(), ToolError>;

    /// Join `inputs` in order into one MP3
    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError>;
}

/// Run a tool to completion, capturing stdout/stderr
///
/// Non-zero exit is reported as `ToolError::Failed` with the captured stderr.
pub(crate) async fn run_captured(binary: &str, args: &[&std::ffi::OsStr]) -> Result<Output, ToolError> {
    tracing::debug!(tool = %binary, args = ?args, "Running external tool");

    let output = Command::new(binary)
        .args(args)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| spawn_error(binary, e))?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: binary.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(output)
}

pub(crate) fn spawn_error(binary: &str, e: std::io::Error) -> ToolError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ToolError::NotInstalled(binary.to_string())
    } else {
        ToolError::Spawn {
            tool: binary.to_string(),
            source: e,
        }
    }
}
