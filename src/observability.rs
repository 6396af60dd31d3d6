//! Logging configuration, subscriber setup and the client lifecycle events.

use std::env;
use std::net::SocketAddr;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ClientConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Unparsable values keep their defaults instead of failing startup.
pub fn logging_config_from_env() -> LoggingConfig {
    let defaults = LoggingConfig::default();

    let level = env::var("PULSEFORGE_LOG_LEVEL")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .unwrap_or(defaults.level);
    let format = env::var("PULSEFORGE_LOG_FORMAT")
        .ok()
        .and_then(|raw| parse_log_format(&raw))
        .unwrap_or(defaults.format);
    let include_target = env::var("PULSEFORGE_LOG_TARGET")
        .ok()
        .and_then(|raw| parse_bool(&raw))
        .unwrap_or(defaults.include_target);

    LoggingConfig {
        level,
        format,
        include_target,
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(logging: &LoggingConfig, client: &ClientConfig) {
    info!(
        component = "dashboard_client",
        event = "app.start",
        log_level = %logging.level,
        log_format = ?logging.format,
        include_target = logging.include_target,
        default_symbol = %client.default_symbol,
        live_poll_ms = client.live_poll_ms
    );
}

pub fn log_app_bind(bound_addr: SocketAddr) {
    info!(
        component = "dashboard_client",
        event = "app.bind",
        bind_addr = %bound_addr,
        route = "/view/snapshot"
    );
}

/// Which data backend the gateway talks to, and why.
pub fn log_backend_selected(backend: &str, reason: Option<&str>, api_base: Option<&str>) {
    info!(
        component = "dashboard_client",
        event = "backend.selected",
        backend,
        reason = reason.unwrap_or("default"),
        api_base = api_base.unwrap_or("-")
    );
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
