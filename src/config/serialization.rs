//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::{derive_ws_url, Config};

impl Config {
    /// Serialize the effective config as a commented TOML file
    pub fn to_toml(&self) -> String {
        format!(
            r#"# lode configuration

# Log search service (env: LODE_API_URL)
api_url = "{api_url}"

# Socket origin for the live tail and chat (env: LODE_WS_URL)
# Derived from api_url when unset (http -> ws, https -> wss)
{ws_url_line}

# Results per page: 10, 50, 100, 500 (env: LODE_PAGE_SIZE)
page_size = {page_size}

# Rows kept on screen in live mode
tail_capacity = {tail_capacity}

# Timers
[timing]
search_debounce_ms = {debounce}
# Chat answer ends after this long without a token
chat_idle_ms = {idle}
# Hard limit on a single chat answer
chat_ceiling_ms = {ceiling}
request_timeout_secs = {request_timeout}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = "{log_level}"
# JSON file logging (in addition to stderr)
file_enabled = {log_file_enabled}
file_dir = "{log_file_dir}"
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = "{log_file_prefix}"
"#,
            api_url = self.api_url,
            ws_url_line = self.ws_url_line(),
            page_size = self.page_size,
            tail_capacity = self.tail_capacity,
            debounce = self.timing.search_debounce_ms,
            idle = self.timing.chat_idle_ms,
            ceiling = self.timing.chat_ceiling_ms,
            request_timeout = self.timing.request_timeout_secs,
            log_level = self.logging.level,
            log_file_enabled = self.logging.file_enabled,
            // Forward slashes keep Windows paths valid inside TOML basic strings
            log_file_dir = self.logging.file_dir.display().to_string().replace('\\', "/"),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = self.logging.file_prefix,
        )
    }

    /// `ws_url` is only written live when it differs from the derived origin,
    /// so a later `api_url` change still moves the sockets
    fn ws_url_line(&self) -> String {
        if self.ws_url == derive_ws_url(&self.api_url) {
            format!("# ws_url = \"{}\"", self.ws_url)
        } else {
            format!("ws_url = \"{}\"", self.ws_url)
        }
    }
}
