//! Fetcher progress reporting
//!
//! The fetcher is driven with `--progress-template`/`--print` so that every
//! line we care about starts with a marker. Anything else is ordinary log
//! output.

/// Download phase line: `AUDIOKIT_DOWNLOAD|<percent string>`
pub const DOWNLOAD_MARKER: &str = "AUDIOKIT_DOWNLOAD|";
/// Post-processing phase line: `AUDIOKIT_POSTPROCESS|<status>|<postprocessor>`
pub const POSTPROCESS_MARKER: &str = "AUDIOKIT_POSTPROCESS|";
/// Final title line: `AUDIOKIT_TITLE|<title>`
pub const TITLE_MARKER: &str = "AUDIOKIT_TITLE|";

/// Progress event reported by a fetcher
#[derive(Debug, Clone, PartialEq)]
pub enum FetchProgress {
    /// Transfer in progress
    Downloading {
        /// Parsed percentage, `None` if the tool's value was unusable
        percent: Option<f64>,
        /// Percentage as the tool printed it
        percent_text: String,
    },
    /// Transfer done, audio extraction running
    PostProcessing,
}

impl FetchProgress {
    /// Build a download event from the tool's raw percent string
    pub fn downloading(percent_text: &str) -> Self {
        FetchProgress::Downloading {
            percent: parse_percent(percent_text),
            percent_text: percent_text.trim().to_string(),
        }
    }
}

/// One classified line of fetcher output
#[derive(Debug, Clone, PartialEq)]
pub enum FetcherLine {
    Progress(FetchProgress),
    Title(String),
    Other,
}

/// Classify a line of fetcher output
pub fn parse_line(line: &str) -> FetcherLine {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(rest) = line.strip_prefix(DOWNLOAD_MARKER) {
        return FetcherLine::Progress(FetchProgress::downloading(rest));
    }
    if line.starts_with(POSTPROCESS_MARKER) {
        return FetcherLine::Progress(FetchProgress::PostProcessing);
    }
    if let Some(title) = line.strip_prefix(TITLE_MARKER) {
        return FetcherLine::Title(title.to_string());
    }
    FetcherLine::Other
}

/// Tolerant percentage parse: `" 42.3%"` → `Some(42.3)`, garbage → `None`
pub fn parse_percent(text: &str) -> Option<f64> {
    let cleaned: String = strip_ansi(text);
    cleaned
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            // CSI sequence: ESC [ ... final byte in '@'..='~'
            for next in chars.by_ref() {
                if ('@'..='~').contains(&next) && next != '[' {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}
