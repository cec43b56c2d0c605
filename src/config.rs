// Client configuration
//
// Resolution order: CLI flag (or its env fallback, handled by clap) wins,
// then the optional TOML config file, then built-in defaults. The token is
// environment-level configuration and never logged.

use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// Resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, no trailing slash required
    pub base_url: String,
    /// Optional bearer token sent on every request
    pub token: Option<String>,
    /// Bypass the network and serve canned fixtures
    pub mock: bool,
    /// Fixed history page size
    pub page_size: u32,
    /// Directory export files are written into
    pub export_dir: PathBuf,
}

/// Values a CLI invocation may override
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub mock: bool,
    pub page_size: Option<u32>,
    pub export_dir: Option<PathBuf>,
}

/// On-disk shape of `~/.config/cerebro/config.toml`; every field optional
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    base_url: Option<String>,
    token: Option<String>,
    mock: Option<bool>,
    page_size: Option<u32>,
    export_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Resolve configuration from overrides, the config file, and defaults
    pub fn load(overrides: ConfigOverrides) -> Self {
        Self::merge(overrides, read_file_config())
    }

    fn merge(overrides: ConfigOverrides, file: FileConfig) -> Self {
        Self {
            base_url: overrides
                .base_url
                .or(file.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            token: overrides.token.or(file.token),
            mock: overrides.mock || file.mock.unwrap_or(false),
            page_size: overrides
                .page_size
                .or(file.page_size)
                .unwrap_or(DEFAULT_PAGE_SIZE),
            export_dir: overrides
                .export_dir
                .or(file.export_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cerebro").join("config.toml"))
}

fn read_file_config() -> FileConfig {
    let Some(path) = config_file_path() else {
        return FileConfig::default();
    };
    let Ok(content) = std::fs::read_to_string(&path) else {
        return FileConfig::default();
    };
    match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Ignoring malformed config file {}: {}", path.display(), e);
            FileConfig::default()
        }
    }
}
