//! Bootstrap configuration and root folder resolution
//!
//! The TOML file is optional. A missing or unreadable file never stops
//! startup: a warning is logged and built-in defaults apply.
//!
//! Root folder priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`AUDIOKIT_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "AUDIOKIT_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding uploads, outputs, downloads and temp directories
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory of static web UI assets served at `/` (optional)
    #[serde(default)]
    pub static_assets: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// External tool locations (optional)
    #[serde(default)]
    pub tools: ToolConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// External tool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    /// Transcoder executable
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    /// Probe executable
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,

    /// Media fetcher executable
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp: String,

    /// Socket timeout handed to the fetcher, in seconds
    #[serde(default = "default_socket_timeout_secs")]
    pub socket_timeout_secs: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    // 5000 collides with the macOS AirPlay receiver
    5001
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_yt_dlp() -> String {
    "yt-dlp".to_string()
}

fn default_socket_timeout_secs() -> u64 {
    30
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: default_bind_address(),
            port: default_port(),
            static_assets: None,
            logging: LoggingConfig::default(),
            tools: ToolConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            yt_dlp: default_yt_dlp(),
            socket_timeout_secs: default_socket_timeout_secs(),
        }
    }
}

/// Parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Load the TOML config, degrading to defaults on any problem
///
/// With no explicit path the platform default location is tried.
pub fn load_toml_config(explicit: Option<&Path>, module_name: &str) -> TomlConfig {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path(module_name) {
            Some(path) => path,
            None => {
                warn!("Could not determine config directory, using defaults");
                return TomlConfig::default();
            }
        },
    };

    if !path.exists() {
        if explicit.is_some() {
            warn!("Config file not found: {}, using defaults", path.display());
        } else {
            info!("No config file at {}, using defaults", path.display());
        }
        return TomlConfig::default();
    }

    match read_toml_config(&path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{}; using defaults", e);
            TomlConfig::default()
        }
    }
}

/// Default configuration file path for the platform
///
/// `<config_dir>/audiokit/<module_name>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("audiokit").join(format!("{}.toml", module_name)))
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    // ~/.local/share/audiokit, ~/Library/Application Support/audiokit, %LOCALAPPDATA%\audiokit
    dirs::data_local_dir()
        .map(|d| d.join("audiokit"))
        .unwrap_or_else(|| PathBuf::from("./audiokit_data"))
}

/// Root folder resolver following the priority order in the module docs
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self {
            cli_arg: None,
            toml_value: None,
        }
    }

    /// Set the command-line override
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Set the value read from the TOML config
    pub fn with_toml_value(mut self, path: Option<PathBuf>) -> Self {
        self.toml_value = path;
        self
    }

    /// Resolve the root folder
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            return path.clone();
        }

        default_root_folder()
    }
}

impl Default for RootFolderResolver {
    fn default() -> Self {
        Self::new()
    }
}
