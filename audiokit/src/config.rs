//! Service settings resolution
//!
//! Merges command-line overrides with the TOML bootstrap config.
//!
//! **Priority:** CLI → ENV → TOML → built-in default (root folder);
//! CLI → TOML → default (port, bind address, static assets).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use audiokit_common::config::{RootFolderResolver, TomlConfig};
use audiokit_common::{Error, Result};
use tracing::info;

use crate::storage::StorageLayout;
use crate::tools::FetchOptions;

/// Values supplied on the command line (all optional)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub static_assets: Option<PathBuf>,
}

/// Fully resolved service settings
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub root_folder: PathBuf,
    pub listen_addr: SocketAddr,
    pub static_assets: Option<PathBuf>,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub yt_dlp: String,
    pub socket_timeout: Duration,
}

impl ServiceSettings {
    pub fn resolve(cli: CliOverrides, toml: TomlConfig) -> Result<Self> {
        let root_folder = RootFolderResolver::new()
            .with_cli_arg(cli.root_folder)
            .with_toml_value(toml.root_folder)
            .resolve();

        let bind_address = cli.bind_address.unwrap_or(toml.bind_address);
        let ip: IpAddr = bind_address
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", bind_address, e)))?;
        let port = cli.port.unwrap_or(toml.port);

        let settings = Self {
            root_folder,
            listen_addr: SocketAddr::new(ip, port),
            static_assets: cli.static_assets.or(toml.static_assets),
            ffmpeg: toml.tools.ffmpeg,
            ffprobe: toml.tools.ffprobe,
            yt_dlp: toml.tools.yt_dlp,
            socket_timeout: Duration::from_secs(toml.tools.socket_timeout_secs),
        };

        info!(
            root_folder = %settings.root_folder.display(),
            listen = %settings.listen_addr,
            "Settings resolved"
        );
        Ok(settings)
    }

    pub fn storage_layout(&self) -> StorageLayout {
        StorageLayout::from_root(&self.root_folder)
    }

    /// Fixed fetch parameters with the configured socket timeout
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            socket_timeout: self.socket_timeout,
            ..FetchOptions::default()
        }
    }
}
