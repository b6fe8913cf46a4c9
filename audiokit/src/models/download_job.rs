//! Download job state machine
//!
//! QUEUED → DOWNLOADING → PROCESSING → COMPLETED, with ERROR reachable from
//! any non-terminal state. COMPLETED and ERROR are terminal.

use audiokit_common::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Download job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, worker not yet started
    Queued,
    /// Fetcher is transferring media
    Downloading,
    /// Fetcher is extracting/transcoding audio
    Processing,
    /// Artifact stored in the downloads directory
    Completed,
    /// Job failed; see `error_detail`
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// Status record polled by clients
///
/// Completed-only fields (`output_file_name`, `title`) and the Error-only
/// `error_detail` are never populated together. Status transitions replace
/// the whole record so no field from a previous phase survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub status: JobStatus,

    /// Percentage complete (0.0 - 100.0)
    pub progress: f64,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl DownloadJob {
    /// Fresh record for an accepted request
    pub fn queued() -> Self {
        Self::with_status(JobStatus::Queued, 0.0, "Queued for download...")
    }

    fn with_status(status: JobStatus, progress: f64, message: impl Into<String>) -> Self {
        Self {
            status,
            progress,
            message: message.into(),
            output_file_name: None,
            title: None,
            error_detail: None,
            updated_at: time::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Worker picked the job up
    pub fn start_download(&mut self) {
        *self = Self::with_status(JobStatus::Downloading, 0.0, "Starting download...");
    }

    /// Apply a download progress report
    ///
    /// `percent` is `None` when the fetcher's value could not be parsed; the
    /// previous progress is kept in that case. Reports arriving after
    /// processing began are ignored.
    pub fn record_download_progress(&mut self, percent: Option<f64>, percent_text: &str) {
        if self.status == JobStatus::Processing {
            return;
        }
        if let Some(value) = percent {
            self.progress = value.clamp(0.0, 100.0);
        }
        let shown = if percent_text.trim().is_empty() {
            "0%"
        } else {
            percent_text.trim()
        };
        self.message = format!("Downloading... {}", shown);
        self.updated_at = time::now();
    }

    /// Fetcher moved on to audio extraction
    pub fn begin_processing(&mut self) {
        *self = Self::with_status(JobStatus::Processing, 95.0, "Processing audio...");
    }

    pub fn complete(&mut self, output_file_name: String, title: String) {
        *self = Self {
            output_file_name: Some(output_file_name),
            title: Some(title),
            ..Self::with_status(JobStatus::Completed, 100.0, "Download complete!")
        };
    }

    pub fn fail(&mut self, message: String, detail: String) {
        *self = Self {
            error_detail: Some(detail),
            ..Self::with_status(JobStatus::Error, 0.0, message)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queued_record() {
        let job = DownloadJob::queued();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0.0);
        assert!(!job.is_terminal());
        assert!(job.output_file_name.is_none());
        assert!(job.error_detail.is_none());
    }

    #[test]
    fn test_download_progress_keeps_value_on_parse_failure() {
        let mut job = DownloadJob::queued();
        job.start_download();
        job.record_download_progress(Some(42.5), " 42.5%");
        assert_eq!(job.progress, 42.5);
        assert_eq!(job.message, "Downloading... 42.5%");

        job.record_download_progress(None, "N/A");
        assert_eq!(job.progress, 42.5);
        assert_eq!(job.message, "Downloading... N/A");
    }

    #[test]
    fn test_download_progress_is_clamped() {
        let mut job = DownloadJob::queued();
        job.record_download_progress(Some(140.0), "140%");
        assert_eq!(job.progress, 100.0);
        job.record_download_progress(Some(-3.0), "");
        assert_eq!(job.progress, 0.0);
        assert_eq!(job.message, "Downloading... 0%");
    }

    #[test]
    fn test_processing_forces_95() {
        let mut job = DownloadJob::queued();
        job.record_download_progress(Some(99.0), "99%");
        job.begin_processing();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, 95.0);
        assert_eq!(job.message, "Processing audio...");
    }

    #[test]
    fn test_late_download_report_does_not_undo_processing() {
        let mut job = DownloadJob::queued();
        job.start_download();
        job.begin_processing();
        let before = job.clone();

        job.record_download_progress(Some(60.0), "60.0%");
        assert_eq!(job, before);
    }

    #[test]
    fn test_terminal_records_populate_exclusive_fields() {
        let mut done = DownloadJob::queued();
        done.complete("Song.mp3".into(), "Song".into());
        assert!(done.is_terminal());
        assert_eq!(done.progress, 100.0);
        assert_eq!(done.output_file_name.as_deref(), Some("Song.mp3"));
        assert_eq!(done.title.as_deref(), Some("Song"));
        assert!(done.error_detail.is_none());

        let mut failed = DownloadJob::queued();
        failed.fail("boom".into(), "raw boom".into());
        assert!(failed.is_terminal());
        assert_eq!(failed.progress, 0.0);
        assert!(failed.output_file_name.is_none());
        assert!(failed.title.is_none());
        assert_eq!(failed.error_detail.as_deref(), Some("raw boom"));
    }

    #[test]
    fn test_serialized_shape() {
        let mut job = DownloadJob::queued();
        job.complete("Song.mp3".into(), "Song".into());
        let value = serde_json::to_value(&job).unwrap();

        assert_eq!(value["status"], "completed");
        assert_eq!(value["outputFileName"], "Song.mp3");
        assert_eq!(value["title"], "Song");
        assert!(value.get("errorDetail").is_none());
        assert!(value.get("updatedAt").is_some());
    }
}
