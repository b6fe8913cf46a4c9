//! ffmpeg/ffprobe transcoder
//!
//! Probe, trim and concatenate through the command-line tools. Output is
//! always MP3 (libmp3lame) at a fixed bitrate.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use super::{run_captured, ToolError, Transcoder, MP3_BITRATE};

/// Transcoder backed by the `ffmpeg` and `ffprobe` executables
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: String,
    ffprobe: String,
    /// Where concat manifests are written
    scratch_dir: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>, scratch_dir: PathBuf) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            scratch_dir,
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn is_available(&self) -> bool {
        match Command::new(&self.ffmpeg)
            .arg("-version")
            .stdin(std::process::Stdio::null())
            .output()
            .await
        {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::debug!(tool = %self.ffmpeg, error = %e, "Transcoder not invocable");
                false
            }
        }
    }

    async fn probe_duration(&self, path: &Path) -> Option<f64> {
        let args: [&OsStr; 7] = [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-show_entries"),
            OsStr::new("format=duration"),
            OsStr::new("-of"),
            OsStr::new("default=noprint_wrappers=1:nokey=1"),
            path.as_os_str(),
        ];

        match run_captured(&self.ffprobe, &args).await {
            Ok(output) => parse_duration(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Duration probe failed");
                None
            }
        }
    }

    async fn trim(
        &self,
        input: &Path,
        start: f64,
        duration: f64,
        output: &Path,
    ) -> Result<(), ToolError> {
        let start = start.to_string();
        let duration = duration.to_string();
        let args: [&OsStr; 12] = [
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-ss"),
            OsStr::new(&start),
            OsStr::new("-t"),
            OsStr::new(&duration),
            OsStr::new("-c:a"),
            OsStr::new("libmp3lame"),
            OsStr::new("-b:a"),
            OsStr::new(MP3_BITRATE),
            OsStr::new("-y"),
            output.as_os_str(),
        ];

        run_captured(&self.ffmpeg, &args).await?;
        Ok(())
    }

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        let manifest_path = self
            .scratch_dir
            .join(format!("concat_{}.txt", Uuid::new_v4()));
        let manifest = concat_manifest(inputs)?;
        tokio::fs::write(&manifest_path, manifest).await?;

        let args: [&OsStr; 12] = [
            OsStr::new("-f"),
            OsStr::new("concat"),
            OsStr::new("-safe"),
            OsStr::new("0"),
            OsStr::new("-i"),
            manifest_path.as_os_str(),
            OsStr::new("-c:a"),
            OsStr::new("libmp3lame"),
            OsStr::new("-b:a"),
            OsStr::new(MP3_BITRATE),
            OsStr::new("-y"),
            output.as_os_str(),
        ];
        let result = run_captured(&self.ffmpeg, &args).await;

        if let Err(e) = tokio::fs::remove_file(&manifest_path).await {
            tracing::debug!(path = %manifest_path.display(), error = %e, "Manifest cleanup failed");
        }

        result.map(|_| ())
    }
}

/// Parse ffprobe's bare duration output
pub fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Build an ffmpeg concat demuxer manifest
///
/// One `file '<absolute path>'` line per input. Single quotes inside paths
/// are closed, escaped and reopened (`'\''`).
pub fn concat_manifest(inputs: &[PathBuf]) -> std::io::Result<String> {
    let mut manifest = String::new();
    for input in inputs {
        let absolute = std::path::absolute(input)?;
        let escaped = absolute.to_string_lossy().replace('\'', "'\\''");
        manifest.push_str("file '");
        manifest.push_str(&escaped);
        manifest.push_str("'\n");
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("12.345000\n"), Some(12.345));
        assert_eq!(parse_duration("N/A\n"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("-1"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_concat_manifest_escapes_quotes() {
        let inputs = vec![
            PathBuf::from("/data/uploads/a.mp3"),
            PathBuf::from("/data/uploads/it's.wav"),
        ];
        let manifest = concat_manifest(&inputs).unwrap();

        assert_eq!(
            manifest,
            "file '/data/uploads/a.mp3'\nfile '/data/uploads/it'\\''s.wav'\n"
        );
    }

    #[test]
    fn test_concat_manifest_uses_absolute_paths() {
        let manifest = concat_manifest(&[PathBuf::from("uploads/a.mp3")]).unwrap();
        let line = manifest.lines().next().unwrap();
        let path = line
            .strip_prefix("file '")
            .and_then(|rest| rest.strip_suffix('\''))
            .unwrap();

        assert!(Path::new(path).is_absolute());
        assert!(path.ends_with("a.mp3"));
    }

    #[tokio::test]
    async fn test_missing_transcoder_is_unavailable() {
        let temp = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new(
            "audiokit-no-such-ffmpeg",
            "audiokit-no-such-ffprobe",
            temp.path().to_path_buf(),
        );

        assert!(!transcoder.is_available().await);
        assert_eq!(transcoder.probe_duration(Path::new("x.mp3")).await, None);
    }

    #[tokio::test]
    async fn test_concatenate_removes_manifest_on_failure() {
        let temp = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new(
            "audiokit-no-such-ffmpeg",
            "audiokit-no-such-ffprobe",
            temp.path().to_path_buf(),
        );

        let result = transcoder
            .concatenate(
                &[temp.path().join("a.mp3"), temp.path().join("b.mp3")],
                &temp.path().join("out.mp3"),
            )
            .await;

        assert!(matches!(result, Err(ToolError::NotInstalled(_))));
        let leftovers = std::fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
