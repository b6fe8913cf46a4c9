//! Fetch-and-convert worker
//!
//! Runs one download job from DOWNLOADING to a terminal state. Results are
//! only ever communicated through the job registry; nothing is returned to
//! the HTTP layer. Scratch files carrying the job id prefix are removed on
//! every exit path.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use uuid::Uuid;

use crate::jobs::JobRegistry;
use crate::models::DownloadJob;
use crate::storage::StorageLayout;
use crate::tools::{FetchOptions, FetchProgress, FetchRequest, MediaFetcher, ToolError};

use super::cleanup::remove_prefixed;
use super::naming::{file_name_of, reserve_unique_path, sanitize_title};

/// Marker the fetch library leaves in diagnostics for its known HTTP
/// compatibility failure
const HTTP_COMPAT_MARKER: &str = "_http_error";

/// Fetch job errors
#[derive(Debug, Error)]
pub enum FetchJobError {
    /// Fetcher failed or was cancelled
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Fetcher reported success but produced no audio file
    #[error("MP3 file not created: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// Moving the artifact into the downloads directory failed
    #[error("Failed to store audio file: {0}")]
    Store(#[source] std::io::Error),
}

impl FetchJobError {
    /// Raw failure text recorded as the job's error detail
    pub fn detail(&self) -> String {
        match self {
            FetchJobError::Tool(e) => e.diagnostics(),
            other => other.to_string(),
        }
    }

    /// Message shown to the polling client
    pub fn user_message(&self) -> String {
        if let FetchJobError::Tool(ToolError::Cancelled(_)) = self {
            return "Download cancelled".to_string();
        }

        let detail = self.detail();
        if detail.contains(HTTP_COMPAT_MARKER) {
            let excerpt: String = detail.chars().take(100).collect();
            return format!(
                "HTTP error during download. Please try again in a moment. (Error: {})",
                excerpt
            );
        }
        detail
    }
}

/// Worker for a single fetch job
///
/// Holds clones of the shared registry and storage layout; one worker is
/// spawned per accepted request.
pub struct FetchWorker {
    jobs: JobRegistry,
    fetcher: Arc<dyn MediaFetcher>,
    layout: Arc<StorageLayout>,
    options: FetchOptions,
}

impl FetchWorker {
    pub fn new(
        jobs: JobRegistry,
        fetcher: Arc<dyn MediaFetcher>,
        layout: Arc<StorageLayout>,
        options: FetchOptions,
    ) -> Self {
        Self {
            jobs,
            fetcher,
            layout,
            options,
        }
    }

    /// Launch the job as a background task registered with `tasks`
    ///
    /// The handle may be dropped; shutdown waits on the tracker so the job
    /// still reaches its scratch cleanup.
    pub fn spawn(
        self,
        tasks: &TaskTracker,
        url: String,
        job_id: Uuid,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tasks.spawn(async move { self.run(url, job_id, cancel).await })
    }

    /// Drive the job to a terminal state
    pub async fn run(&self, url: String, job_id: Uuid, cancel: CancellationToken) {
        let span = tracing::info_span!("fetch_job", job_id = %job_id);
        self.run_job(url, job_id, cancel).instrument(span).await
    }

    async fn run_job(&self, url: String, job_id: Uuid, cancel: CancellationToken) {
        tracing::info!(url = %url, "Fetch job started");
        self.apply(job_id, DownloadJob::start_download).await;

        let request = FetchRequest {
            url,
            job_id,
            scratch_dir: self.layout.temp.clone(),
            options: self.options.clone(),
        };

        match self.fetch_and_store(&request, &cancel).await {
            Ok((file_name, title)) => {
                tracing::info!(file = %file_name, title = %title, "Fetch job completed");
                self.apply(job_id, |job| job.complete(file_name, title)).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Fetch job failed");
                let message = e.user_message();
                let detail = e.detail();
                self.apply(job_id, |job| job.fail(message, detail)).await;
            }
        }

        let removed = remove_prefixed(&self.layout.temp, &job_id.to_string()).await;
        tracing::debug!(removed, "Scratch files cleaned up");
    }

    async fn fetch_and_store(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<(String, String), FetchJobError> {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let fetch = self
            .fetcher
            .fetch_audio(request, progress_tx, cancel.clone());
        tokio::pin!(fetch);

        // Progress is applied in report order; pending events are always
        // drained before the fetch result is looked at.
        let outcome = loop {
            tokio::select! {
                biased;
                Some(event) = progress_rx.recv() => self.apply_progress(request.job_id, event).await,
                result = &mut fetch => break result,
            }
        };
        while let Ok(event) = progress_rx.try_recv() {
            self.apply_progress(request.job_id, event).await;
        }

        let media = outcome?;

        let artifact = request.expected_artifact();
        if !tokio::fs::try_exists(&artifact).await.unwrap_or(false) {
            return Err(FetchJobError::ArtifactMissing(artifact));
        }

        let destination = reserve_unique_path(
            &self.layout.downloads,
            &sanitize_title(&media.title),
            &request.options.audio_codec,
        )
        .await
        .map_err(FetchJobError::Store)?;

        if let Err(e) = tokio::fs::rename(&artifact, &destination).await {
            if let Err(cleanup) = tokio::fs::remove_file(&destination).await {
                tracing::debug!(error = %cleanup, "Reserved name not released");
            }
            return Err(FetchJobError::Store(e));
        }

        Ok((file_name_of(&destination), media.title))
    }

    async fn apply_progress(&self, job_id: Uuid, event: FetchProgress) {
        match event {
            FetchProgress::Downloading {
                percent,
                percent_text,
            } => {
                self.apply(job_id, |job| {
                    job.record_download_progress(percent, &percent_text)
                })
                .await
            }
            FetchProgress::PostProcessing => {
                self.apply(job_id, DownloadJob::begin_processing).await
            }
        }
    }

    async fn apply<F>(&self, job_id: Uuid, mutate: F)
    where
        F: FnOnce(&mut DownloadJob),
    {
        if let Err(e) = self.jobs.update(job_id, mutate).await {
            tracing::warn!(error = %e, "Job update rejected");
        }
    }
}
