//! Business logic services for audiokit
//!
//! - Fetch-and-convert worker driving download jobs
//! - Artifact naming
//! - Scratch file cleanup

pub mod cleanup;
pub mod fetch_worker;
pub mod naming;

pub use cleanup::{remove_prefixed, ScratchFiles};
pub use fetch_worker::{FetchJobError, FetchWorker};
pub use naming::{reserve_unique_path, sanitize_title};
