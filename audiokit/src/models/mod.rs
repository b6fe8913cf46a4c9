//! Data models for audiokit
//!
//! - Download job state machine tracked by the job registry

pub mod download_job;

pub use download_job::{DownloadJob, JobStatus};
