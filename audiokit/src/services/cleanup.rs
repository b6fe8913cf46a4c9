//! Best-effort removal of temporary files
//!
//! Cleanup is advisory: failures are logged at debug level and never
//! escalated.

use std::path::{Path, PathBuf};

/// Delete every file in `dir` whose name starts with `prefix`
///
/// Returns the number of files removed.
pub async fn remove_prefixed(dir: &Path, prefix: &str) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Scratch directory unreadable");
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Scratch listing interrupted");
                break;
            }
        };

        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "Scratch file not removed"),
        }
    }
    removed
}

/// Request-scoped temporary files, removed when the guard drops
///
/// Covers every exit path of a handler, including early returns and `?`.
#[derive(Debug, Default)]
pub struct ScratchFiles {
    paths: Vec<PathBuf>,
}

impl ScratchFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a file for removal
    pub fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Stop tracking a file that must outlive the request
    pub fn keep(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %e, "Temporary file not removed");
                }
            }
        }
    }
}
