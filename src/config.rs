//! Client configuration
//!
//! Centralized configuration with environment variable support and sensible
//! defaults. Endpoint hosts live here instead of being baked into the client.

use std::env;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Chat client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend endpoint configuration
    pub api: ApiConfig,
    /// Reconnection policy
    pub reconnect: ReconnectConfig,
}

/// Backend endpoint configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the REST service (e.g. `http://localhost:8000`)
    pub base_url: String,
    /// Base URL of the chat WebSocket service; derived from `base_url` when unset
    pub ws_base_url: Option<String>,
    /// Timeout applied to REST requests (in seconds)
    pub request_timeout_secs: u64,
}

/// Reconnection policy
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Fixed delay between a close and the next connection attempt (in milliseconds)
    pub delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: DEFAULT_API_URL.to_string(),
                ws_base_url: None,
                request_timeout_secs: 30,
            },
            reconnect: ReconnectConfig { delay_ms: 3000 },
        }
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api: ApiConfig {
                base_url: env::var("LEARNCONNECT_API_URL")
                    .ok()
                    .filter(|url| !url.trim().is_empty())
                    .unwrap_or(defaults.api.base_url),
                ws_base_url: env::var("LEARNCONNECT_WS_URL")
                    .ok()
                    .filter(|url| !url.trim().is_empty()),
                request_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(defaults.api.request_timeout_secs),
            },
            reconnect: ReconnectConfig {
                delay_ms: env::var("CHAT_RECONNECT_DELAY_MS")
                    .ok()
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(defaults.reconnect.delay_ms),
            },
        }
    }

    /// Base URL for WebSocket connections
    ///
    /// Uses the explicit override when present, otherwise swaps the REST
    /// scheme for its WebSocket counterpart (`http` -> `ws`, `https` -> `wss`).
    pub fn ws_base_url(&self) -> String {
        if let Some(url) = &self.api.ws_base_url {
            return url.clone();
        }
        let base = &self.api.base_url;
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.clone()
        }
    }

    /// Delay before a scheduled reconnection attempt
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect.delay_ms)
    }

    /// Timeout for REST requests
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }
}
