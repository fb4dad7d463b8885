//! Client configuration loaded from environment variables.
//!
//! Every setting has a default matching the server's expectations, so a
//! session can start with zero configuration.

use std::time::Duration;

use parley_shared::constants::{
    DEFAULT_ACK_TIMEOUT_MS, DEFAULT_READ_DEBOUNCE_MS, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_TYPING_QUIET_MS, READ_RECEIPT_PATH,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the chat server, used for the read-receipt endpoint.
    /// Env: `PARLEY_SERVER_URL`
    /// Default: `http://127.0.0.1:5000`
    pub server_url: String,

    /// Path of the read-receipt endpoint.
    /// Env: `PARLEY_READ_PATH`
    /// Default: `/chat/read`
    pub read_path: String,

    /// Bounded wait for a `send_message` acknowledgment.
    /// Env: `PARLEY_ACK_TIMEOUT_MS`
    pub ack_timeout: Duration,

    /// Quiet period after which local typing is retracted.
    /// Env: `PARLEY_TYPING_QUIET_MS`
    pub typing_quiet: Duration,

    /// Debounce window for read-position writes.
    /// Env: `PARLEY_READ_DEBOUNCE_MS`
    pub read_debounce: Duration,

    /// Bounded wait for one read-receipt write.
    /// Env: `PARLEY_READ_TIMEOUT_MS`
    pub read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            read_path: READ_RECEIPT_PATH.to_string(),
            ack_timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS),
            typing_quiet: Duration::from_millis(DEFAULT_TYPING_QUIET_MS),
            read_debounce: Duration::from_millis(DEFAULT_READ_DEBOUNCE_MS),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("PARLEY_SERVER_URL") {
            let url = url.trim().trim_end_matches('/');
            if !url.is_empty() {
                config.server_url = url.to_string();
            }
        }

        if let Some(path) = lookup("PARLEY_READ_PATH") {
            if path.starts_with('/') {
                config.read_path = path;
            } else {
                tracing::warn!(value = %path, "PARLEY_READ_PATH must start with '/', using default");
            }
        }

        if let Some(timeout) = parse_millis(&lookup, "PARLEY_ACK_TIMEOUT_MS") {
            config.ack_timeout = timeout;
        }
        if let Some(quiet) = parse_millis(&lookup, "PARLEY_TYPING_QUIET_MS") {
            config.typing_quiet = quiet;
        }
        if let Some(debounce) = parse_millis(&lookup, "PARLEY_READ_DEBOUNCE_MS") {
            config.read_debounce = debounce;
        }
        if let Some(timeout) = parse_millis(&lookup, "PARLEY_READ_TIMEOUT_MS") {
            config.read_timeout = timeout;
        }

        config
    }

    /// Absolute URL of the read-receipt endpoint.
    pub fn read_url(&self) -> String {
        format!("{}{}", self.server_url, self.read_path)
    }
}

fn parse_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid duration, using default");
            None
        }
    }
}
