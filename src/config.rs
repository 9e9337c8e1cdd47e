//! Client configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honored for local development.

use crate::session::SessionMode;
use std::env;

/// Default API root used by the web client in development.
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Raw WebSocket transport of the STOMP endpoint (the SockJS `/ws` mount).
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws/websocket";

/// Client configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Athlos REST API (no trailing slash)
    pub api_base_url: String,
    /// STOMP-over-WebSocket endpoint for live leaderboards
    pub ws_url: String,
    /// Bearer token from a previous login
    pub auth_token: Option<String>,
    /// Signed-in user; `None` runs in guest mode
    pub user_id: Option<u64>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            auth_token: None,
            user_id: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let api_base_url = env::var("ATHLOS_API_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let ws_url = env::var("ATHLOS_WS_URL")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|_| DEFAULT_WS_URL.to_string());

        let auth_token = env::var("ATHLOS_TOKEN")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let user_id = match env::var("ATHLOS_USER_ID") {
            Ok(raw) if !raw.trim().is_empty() => Some(parse_user_id(raw.trim())?),
            _ => None,
        };

        Ok(Self {
            api_base_url,
            ws_url,
            auth_token,
            user_id,
        })
    }

    /// Session mode implied by the configured user.
    pub fn session_mode(&self) -> SessionMode {
        match self.user_id {
            Some(user_id) => SessionMode::Authenticated { user_id },
            None => SessionMode::Guest,
        }
    }
}

fn parse_user_id(raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::Invalid {
            var: "ATHLOS_USER_ID",
            value: raw.to_string(),
        }),
        Ok(id) => Ok(id),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}
