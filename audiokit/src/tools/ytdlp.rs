//! yt-dlp media fetcher
//!
//! Downloads the best audio stream of a single item and has yt-dlp's
//! ffmpeg post-processor convert it to MP3. Progress and the final title are
//! read from marker lines on both output streams (builds differ in which
//! stream carries progress).

use std::ffi::OsString;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::progress::{parse_line, FetcherLine, DOWNLOAD_MARKER, POSTPROCESS_MARKER, TITLE_MARKER};
use super::{spawn_error, FetchProgress, FetchRequest, FetchedMedia, MediaFetcher, ToolError};

/// Lines of stderr kept for failure diagnostics
const STDERR_TAIL_LINES: usize = 20;

/// Fetcher backed by the `yt-dlp` executable
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary: String,
}

impl YtDlpFetcher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// Command-line arguments for one fetch
pub fn build_args(request: &FetchRequest) -> Vec<OsString> {
    let options = &request.options;
    let mut args: Vec<OsString> = vec![
        "--format".into(),
        options.format.clone().into(),
        "--extract-audio".into(),
        "--audio-format".into(),
        options.audio_codec.clone().into(),
        "--audio-quality".into(),
        options.audio_quality.clone().into(),
        "--socket-timeout".into(),
        options.socket_timeout.as_secs().to_string().into(),
        "--no-color".into(),
        "--newline".into(),
        "--progress".into(),
        "--progress-template".into(),
        format!("download:{}%(progress._percent_str)s", DOWNLOAD_MARKER).into(),
        "--progress-template".into(),
        format!(
            "postprocess:{}%(progress.status)s|%(progress.postprocessor)s",
            POSTPROCESS_MARKER
        )
        .into(),
        "--print".into(),
        format!("after_move:{}%(title)s", TITLE_MARKER).into(),
        "--output".into(),
        request.output_template().into_os_string(),
    ];
    if options.no_playlist {
        args.push("--no-playlist".into());
    }
    args.push("--".into());
    args.push(request.url.clone().into());
    args
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(?stream, error = %e, "Fetcher output stream closed with error");
                    break;
                }
            }
        }
    });
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch_audio(
        &self,
        request: &FetchRequest,
        progress: mpsc::UnboundedSender<FetchProgress>,
        cancel: CancellationToken,
    ) -> Result<FetchedMedia, ToolError> {
        tracing::debug!(job_id = %request.job_id, url = %request.url, "Spawning fetcher");

        let mut child = Command::new(&self.binary)
            .args(build_args(request))
            .env("PYTHONIOENCODING", "UTF-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.binary, e))?;

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, Stream::Stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, Stream::Stderr, line_tx.clone());
        }
        drop(line_tx);

        let mut title = None;
        let mut stderr_tail: Vec<String> = Vec::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(job_id = %request.job_id, "Fetch cancelled, killing fetcher");
                    if let Err(e) = child.kill().await {
                        tracing::debug!(error = %e, "Failed to kill fetcher");
                    }
                    return Err(ToolError::Cancelled(self.binary.clone()));
                }
                line = line_rx.recv() => {
                    let Some((stream, line)) = line else { break };
                    match parse_line(&line) {
                        FetcherLine::Progress(event) => {
                            // Receiver gone means nobody is watching; keep going.
                            let _ = progress.send(event);
                        }
                        FetcherLine::Title(value) => title = Some(value),
                        FetcherLine::Other => {
                            if stream == Stream::Stderr && !line.trim().is_empty() {
                                if stderr_tail.len() == STDERR_TAIL_LINES {
                                    stderr_tail.remove(0);
                                }
                                stderr_tail.push(line);
                            }
                        }
                    }
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(ToolError::Failed {
                tool: self.binary.clone(),
                code: status.code(),
                stderr: summarize_stderr(&stderr_tail),
            });
        }

        Ok(FetchedMedia {
            title: title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "audio".to_string()),
        })
    }
}

/// Pick the most useful diagnostic from the stderr tail
///
/// yt-dlp prefixes fatal problems with `ERROR:`; the last such line wins,
/// otherwise the whole tail is returned.
pub fn summarize_stderr(tail: &[String]) -> String {
    tail.iter()
        .rev()
        .find(|line| line.trim_start().starts_with("ERROR:"))
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| tail.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FetchOptions;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn request() -> FetchRequest {
        FetchRequest {
            url: "https://www.youtube.com/watch?v=abc".into(),
            job_id: Uuid::nil(),
            scratch_dir: PathBuf::from("/data/temp"),
            options: FetchOptions::default(),
        }
    }

    fn arg_after<'a>(args: &'a [OsString], flag: &str) -> Option<&'a OsString> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
    }

    #[test]
    fn test_build_args_fixed_parameters() {
        let args = build_args(&request());

        assert_eq!(arg_after(&args, "--format").unwrap(), "bestaudio/best");
        assert_eq!(arg_after(&args, "--audio-format").unwrap(), "mp3");
        assert_eq!(arg_after(&args, "--audio-quality").unwrap(), "192K");
        assert_eq!(arg_after(&args, "--socket-timeout").unwrap(), "30");
        assert!(args.iter().any(|a| a == "--no-playlist"));
        assert!(args.iter().any(|a| a == "--extract-audio"));
        assert_eq!(
            arg_after(&args, "--output").unwrap(),
            "/data/temp/00000000-0000-0000-0000-000000000000.%(ext)s"
        );
    }

    #[test]
    fn test_build_args_url_is_last_after_separator() {
        let args = build_args(&request());
        let n = args.len();
        assert_eq!(args[n - 2], "--");
        assert_eq!(args[n - 1], "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn test_build_args_playlist_flag_optional() {
        let mut req = request();
        req.options.no_playlist = false;
        assert!(!build_args(&req).iter().any(|a| a == "--no-playlist"));
    }

    #[test]
    fn test_summarize_stderr_prefers_error_line() {
        let tail = vec![
            "WARNING: something odd".to_string(),
            "ERROR: [youtube] abc: Video unavailable".to_string(),
            "some trailing noise".to_string(),
        ];
        assert_eq!(
            summarize_stderr(&tail),
            "ERROR: [youtube] abc: Video unavailable"
        );

        let plain = vec!["first".to_string(), "second".to_string()];
        assert_eq!(summarize_stderr(&plain), "first\nsecond");
    }

    #[tokio::test]
    async fn test_missing_fetcher_is_not_installed() {
        let fetcher = YtDlpFetcher::new("audiokit-no-such-yt-dlp");
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = fetcher
            .fetch_audio(&request(), tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotInstalled(_)));
    }
}
