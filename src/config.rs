//! Client configuration, read once from the environment at startup.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "http://localhost:5000";
pub const DEFAULT_SYMBOL: &str = "AAPL";
pub const DEFAULT_LIVE_POLL_MS: u64 = 4_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: String,
    pub default_symbol: String,
    pub live_poll_ms: u64,
    pub http_timeout_ms: u64,
    pub credentials_path: PathBuf,
    pub view_addr: SocketAddr,
    pub initial_fragment: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            default_symbol: DEFAULT_SYMBOL.to_string(),
            live_poll_ms: DEFAULT_LIVE_POLL_MS,
            http_timeout_ms: 10_000,
            credentials_path: PathBuf::from(".pulseforge/credentials.json"),
            view_addr: SocketAddr::from(([127, 0, 0, 1], 8090)),
            initial_fragment: String::new(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid PULSEFORGE_VIEW_ADDR '{0}'")]
    InvalidViewAddr(String),
    #[error("PULSEFORGE_LIVE_POLL_MS must be >= 1, got '{0}'")]
    InvalidPollPeriod(String),
    #[error("PULSEFORGE_HTTP_TIMEOUT_MS must be >= 1, got '{0}'")]
    InvalidHttpTimeout(String),
}

pub fn client_config_from_env() -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(base) = non_empty_var("PULSEFORGE_API_BASE") {
        config.api_base = base.trim_end_matches('/').to_string();
    }

    if let Some(symbol) = non_empty_var("PULSEFORGE_DEFAULT_SYMBOL") {
        config.default_symbol = symbol.to_uppercase();
    }

    if let Some(raw) = non_empty_var("PULSEFORGE_LIVE_POLL_MS") {
        match raw.parse::<u64>() {
            Ok(ms) if ms > 0 => config.live_poll_ms = ms,
            _ => return Err(ConfigError::InvalidPollPeriod(raw)),
        }
    }

    if let Some(raw) = non_empty_var("PULSEFORGE_HTTP_TIMEOUT_MS") {
        match raw.parse::<u64>() {
            Ok(ms) if ms > 0 => config.http_timeout_ms = ms,
            _ => return Err(ConfigError::InvalidHttpTimeout(raw)),
        }
    }

    if let Some(path) = non_empty_var("PULSEFORGE_CREDENTIALS_PATH") {
        config.credentials_path = PathBuf::from(path);
    }

    if let Some(raw) = non_empty_var("PULSEFORGE_VIEW_ADDR") {
        config.view_addr = raw
            .parse()
            .map_err(|_| ConfigError::InvalidViewAddr(raw.clone()))?;
    }

    if let Some(fragment) = non_empty_var("PULSEFORGE_ROUTE") {
        config.initial_fragment = fragment;
    }

    Ok(config)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}
