//! On-disk layout
//!
//! Four directories under the root folder: upload staging, output artifacts
//! (trim/merge), completed fetch downloads, and scratch space for in-flight
//! jobs.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Upload extensions accepted by the clip and merge endpoints
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a"];

/// Directory layout rooted at the resolved root folder
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub uploads: PathBuf,
    pub outputs: PathBuf,
    pub downloads: PathBuf,
    pub temp: PathBuf,
}

impl StorageLayout {
    pub fn from_root(root: &Path) -> Self {
        Self {
            uploads: root.join("uploads"),
            outputs: root.join("outputs"),
            downloads: root.join("downloads"),
            temp: root.join("temp"),
        }
    }

    /// Create every directory that does not exist yet (idempotent)
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [&self.uploads, &self.outputs, &self.downloads, &self.temp] {
            std::fs::create_dir_all(dir)?;
            tracing::debug!(dir = %dir.display(), "Storage directory ready");
        }
        Ok(())
    }

    /// Staged upload path for a clip source (`<uploads>/<file_id>.<ext>`)
    pub fn upload_path(&self, file_id: &uuid::Uuid, extension: &str) -> PathBuf {
        self.uploads.join(format!("{}.{}", file_id, extension))
    }
}

/// Requested name resolves outside its base directory
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid file path: {0}")]
pub struct PathEscape(pub String);

/// Resolve a client-supplied file name inside `base`
///
/// The join is normalized lexically; anything that ends up outside `base`
/// (parent components, absolute paths, drive prefixes) is rejected.
pub fn resolve_within(base: &Path, requested: &str) -> Result<PathBuf, PathEscape> {
    let base = std::path::absolute(base).map_err(|_| PathEscape(requested.to_string()))?;
    let mut resolved = base.clone();

    for component in Path::new(requested).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathEscape(requested.to_string()));
            }
        }
    }

    if resolved == base || !resolved.starts_with(&base) {
        return Err(PathEscape(requested.to_string()));
    }
    Ok(resolved)
}

/// Lowercased extension if it is an accepted upload format
pub fn allowed_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}
