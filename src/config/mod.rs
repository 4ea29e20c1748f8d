//! Configuration for the console
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/lode/config.toml)
//! 3. Built-in defaults (lowest priority)

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chat::ChatTimings;
use crate::model::PageSize;
use crate::state::StateSettings;
use crate::tail::DEFAULT_TAIL_CAPACITY;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod logging;
mod serialization;
mod timing;


pub use logging::{FileLogging, LoggingConfig};
#[cfg(test)]
use logging::LogRotation;
pub use timing::{FileTiming, TimingConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the log search service
    pub api_url: String,

    /// Origin for the tail and chat sockets; derived from `api_url` when unset
    pub ws_url: String,

    /// Initial page size (10, 50, 100 or 500)
    pub page_size: PageSize,

    /// Rows kept in live mode
    pub tail_capacity: usize,

    /// Debounce, chat timeouts and request timeout
    pub timing: TimingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: derive_ws_url(DEFAULT_API_URL),
            page_size: PageSize::default(),
            tail_capacity: DEFAULT_TAIL_CAPACITY,
            timing: TimingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub page_size: Option<u32>,
    pub tail_capacity: Option<usize>,

    /// Optional [timing] section
    pub timing: Option<FileTiming>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

/// `http://host` -> `ws://host`, `https://host` -> `wss://host`
pub fn derive_ws_url(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        trimmed.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/lode/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("lode").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    /// Called during startup to help users discover configuration options
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        // Don't overwrite existing config
        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Config is optional
            }
        }

        // Config::default().to_toml() is the single source of the template
        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Load file config if it exists
    ///
    /// A file that exists but does not parse is an error: a broken config
    /// should fail fast, not silently fall back to defaults.
    pub(crate) fn load_file_config(path: &Path) -> Result<FileConfig> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => {
                Err(e).with_context(|| format!("Cannot read config file {}", path.display()))
            }
        }
    }

    /// Load configuration: env vars -> file -> defaults
    pub fn from_env() -> Result<Self> {
        let file = match Self::config_path() {
            Some(path) => Self::load_file_config(&path)?,
            None => FileConfig::default(),
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with an environment lookup
    pub(crate) fn from_sources<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // API URL: env > file > default
        let api_url = env("LODE_API_URL")
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        // Socket origin: env > file > derived from the API URL
        let ws_url = env("LODE_WS_URL")
            .or(file.ws_url)
            .unwrap_or_else(|| derive_ws_url(&api_url));

        // Page size: env > file > default (50)
        let page_size = match env("LODE_PAGE_SIZE") {
            Some(raw) => PageSize::parse(&raw)
                .with_context(|| format!("LODE_PAGE_SIZE must be 10, 50, 100 or 500, got '{}'", raw))?,
            None => match file.page_size {
                Some(n) => match PageSize::from_u32(n) {
                    Some(size) => size,
                    None => bail!("page_size must be 10, 50, 100 or 500, got {}", n),
                },
                None => PageSize::default(),
            },
        };

        // Tail capacity: file > default
        let tail_capacity = file.tail_capacity.unwrap_or(DEFAULT_TAIL_CAPACITY);
        if tail_capacity == 0 {
            bail!("tail_capacity must be at least 1");
        }

        let timing = TimingConfig::from_file(file.timing);
        let logging = LoggingConfig::from_file(file.logging);

        Ok(Self {
            api_url,
            ws_url,
            page_size,
            tail_capacity,
            timing,
            logging,
        })
    }

    /// Tunables for the console state
    pub fn state_settings(&self) -> StateSettings {
        StateSettings {
            search_debounce: self.timing.search_debounce(),
            tail_capacity: self.tail_capacity,
            page_size: self.page_size,
            chat: ChatTimings {
                idle: self.timing.chat_idle(),
                ceiling: self.timing.chat_ceiling(),
            },
        }
    }
}
