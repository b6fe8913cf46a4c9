//! Artifact naming
//!
//! Names are reserved by creating an empty placeholder with `create_new`, so
//! two concurrent requests can never claim the same file. The producer then
//! overwrites the placeholder.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;

/// Base name used when a title sanitizes to nothing
pub const FALLBACK_BASE_NAME: &str = "audio";

/// Byte cap on a sanitized base name; leaves room for `_N.<ext>` under the
/// usual 255-byte file name limit
pub const MAX_BASE_NAME_BYTES: usize = 200;

/// Filesystem-safe base name derived from a media title
///
/// Keeps alphanumerics, spaces, hyphens and underscores, cut to
/// `MAX_BASE_NAME_BYTES` on a char boundary; trailing whitespace is trimmed.
pub fn sanitize_title(title: &str) -> String {
    let mut kept = String::new();
    for c in title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
    {
        if kept.len() + c.len_utf8() > MAX_BASE_NAME_BYTES {
            break;
        }
        kept.push(c);
    }
    kept.trim_end().to_string()
}

/// Reserve `<dir>/<base>.<ext>`, or `<base>_1.<ext>`, `<base>_2.<ext>`, … if taken
pub async fn reserve_unique_path(dir: &Path, base: &str, ext: &str) -> std::io::Result<PathBuf> {
    let base = if base.is_empty() { FALLBACK_BASE_NAME } else { base };
    let mut counter: u32 = 0;

    loop {
        let name = if counter == 0 {
            format!("{}.{}", base, ext)
        } else {
            format!("{}_{}.{}", base, counter, ext)
        };
        let candidate = dir.join(name);

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e),
        }
    }
}

/// File name component of a reserved path
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
