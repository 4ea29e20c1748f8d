//! Timer configuration: search debounce, chat timeouts, request timeout

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    /// Quiet period before a search term edit is fetched
    pub search_debounce_ms: u64,
    /// Chat answer ends after this long without a token
    pub chat_idle_ms: u64,
    /// Hard limit on a single chat answer
    pub chat_ceiling_ms: u64,
    /// HTTP request timeout
    pub request_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            search_debounce_ms: 300,
            chat_idle_ms: 3_000,
            chat_ceiling_ms: 30_000,
            request_timeout_secs: 10,
        }
    }
}

/// Timing settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileTiming {
    pub search_debounce_ms: Option<u64>,
    pub chat_idle_ms: Option<u64>,
    pub chat_ceiling_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl TimingConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileTiming>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            search_debounce_ms: file.search_debounce_ms.unwrap_or(defaults.search_debounce_ms),
            chat_idle_ms: file.chat_idle_ms.unwrap_or(defaults.chat_idle_ms),
            chat_ceiling_ms: file.chat_ceiling_ms.unwrap_or(defaults.chat_ceiling_ms),
            request_timeout_secs: file
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
        }
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn chat_idle(&self) -> Duration {
        Duration::from_millis(self.chat_idle_ms)
    }

    pub fn chat_ceiling(&self) -> Duration {
        Duration::from_millis(self.chat_ceiling_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
