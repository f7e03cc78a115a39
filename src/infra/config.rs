use crate::domain::{EstimatorOptions, ReconnectPolicy, Smoothing};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const SERVER_ENV: &str = "RENDERBOX_SERVER";
const TIMEOUT_ENV: &str = "RENDERBOX_TIMEOUT_SECS";
const LOG_DIR_ENV: &str = "RENDERBOX_LOG_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid server url {value}: {reason}")]
    InvalidServerUrl { value: String, reason: String },

    #[error("invalid value for {name}: {value}")]
    InvalidEnvValue { name: &'static str, value: String },

    #[error("home directory not found")]
    HomeDirNotFound,
}

/// Settings given on the command line; each one wins over its env/default.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigOverrides {
    pub server: Option<String>,
    pub timeout_secs: Option<u64>,
    pub no_reconnect: bool,
    pub reconnect_attempts: Option<u32>,
    pub eta_window: Option<usize>,
    pub eta_raw: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server: Url,
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub estimator: EstimatorOptions,
    pub log_dir: PathBuf,
}

pub fn endpoint_url(server: &Url, path: &str) -> String {
    let base = server.as_str().trim_end_matches('/');
    format!("{base}/{}", path.trim_start_matches('/'))
}

pub fn resolve_config(overrides: &ConfigOverrides) -> Result<Config, ConfigError> {
    resolve_config_with(overrides, |name| std::env::var(name).ok())
}

fn resolve_config_with(
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let server_value = overrides
        .server
        .clone()
        .or_else(|| env(SERVER_ENV))
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
    let server = parse_server_url(&server_value)?;

    let timeout_secs = match overrides.timeout_secs {
        Some(secs) => Some(secs),
        None => match env(TIMEOUT_ENV) {
            Some(value) => Some(value.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidEnvValue {
                    name: TIMEOUT_ENV,
                    value,
                }
            })?),
            None => None,
        },
    };
    let request_timeout = timeout_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

    let mut reconnect = ReconnectPolicy::default();
    if let Some(attempts) = overrides.reconnect_attempts {
        reconnect.max_attempts = attempts;
    }
    if overrides.no_reconnect {
        reconnect = ReconnectPolicy::disabled();
    }

    let estimator = EstimatorOptions {
        smoothing: match overrides.eta_window {
            Some(size) if size > 1 => Smoothing::Window(size),
            _ => Smoothing::LastFrame,
        },
        clamp_overshoot: !overrides.eta_raw,
    };

    let log_dir = match env(LOG_DIR_ENV) {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => resolve_renderbox_state_dir()?.join("logs"),
    };

    Ok(Config {
        server,
        request_timeout,
        reconnect,
        estimator,
        log_dir,
    })
}

pub fn resolve_renderbox_state_dir() -> Result<PathBuf, ConfigError> {
    let Some(home) = dirs::home_dir() else {
        return Err(ConfigError::HomeDirNotFound);
    };
    Ok(home.join(".renderbox"))
}

fn parse_server_url(value: &str) -> Result<Url, ConfigError> {
    let trimmed = value.trim();
    let url = Url::parse(trimmed).map_err(|error| ConfigError::InvalidServerUrl {
        value: trimmed.to_string(),
        reason: error.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidServerUrl {
            value: trimmed.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidServerUrl {
            value: trimmed.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}
