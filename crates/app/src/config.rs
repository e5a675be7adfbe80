use std::time::Duration;

use gamma_assets::playback::surface::DEFAULT_PLAYER;
use gamma_client::api::DEFAULT_REQUEST_TIMEOUT;
use gamma_core::Credentials;
use gamma_live::reconnect::DEFAULT_RECONNECT_DELAY;
use gamma_live::ReconnectConfig;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },
}

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local development server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the HTTP API.
    pub api_url: String,
    /// Live channel WebSocket endpoint.
    pub ws_url: String,
    pub request_timeout: Duration,
    pub reconnect: ReconnectConfig,
    /// External player program used by `play`.
    pub player: String,
    /// Use the software streaming engine; otherwise hand the manifest to
    /// the player directly.
    pub software_engine: bool,
    /// Rendition bandwidth cap in bits per second.
    pub max_bandwidth: Option<u64>,
    /// Login credentials; present only when both variables are set.
    pub credentials: Option<Credentials>,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                  |
    /// |----------------------------------|--------------------------|
    /// | `GAMMA_API_URL`                  | `http://localhost:8080`  |
    /// | `GAMMA_WS_URL`                   | `ws://localhost:8080/ws` |
    /// | `GAMMA_REQUEST_TIMEOUT_SECS`     | `30`                     |
    /// | `GAMMA_RECONNECT_DELAY_SECS`     | `5`                      |
    /// | `GAMMA_RECONNECT_MAX_DELAY_SECS` | same as delay            |
    /// | `GAMMA_RECONNECT_MULTIPLIER`     | `1.0`                    |
    /// | `GAMMA_PLAYER`                   | `ffplay`                 |
    /// | `GAMMA_SOFTWARE_ENGINE`          | `true`                   |
    /// | `GAMMA_MAX_BANDWIDTH`            | unset                    |
    /// | `GAMMA_USERNAME`                 | unset                    |
    /// | `GAMMA_PASSWORD`                 | unset                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = var("GAMMA_API_URL")
            .unwrap_or_else(|| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();
        let ws_url = var("GAMMA_WS_URL").unwrap_or_else(|| "ws://localhost:8080/ws".into());

        let request_timeout = match var("GAMMA_REQUEST_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse("GAMMA_REQUEST_TIMEOUT_SECS", &v)?),
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        let delay = match var("GAMMA_RECONNECT_DELAY_SECS") {
            Some(v) => {
                let secs: u64 = parse("GAMMA_RECONNECT_DELAY_SECS", &v)?;
                if secs == 0 {
                    return Err(invalid("GAMMA_RECONNECT_DELAY_SECS", &v));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_RECONNECT_DELAY,
        };
        let max_delay = match var("GAMMA_RECONNECT_MAX_DELAY_SECS") {
            Some(v) => {
                let max = Duration::from_secs(parse("GAMMA_RECONNECT_MAX_DELAY_SECS", &v)?);
                if max < delay {
                    return Err(invalid("GAMMA_RECONNECT_MAX_DELAY_SECS", &v));
                }
                max
            }
            None => delay,
        };
        let multiplier: f64 = match var("GAMMA_RECONNECT_MULTIPLIER") {
            Some(v) => {
                let m: f64 = parse("GAMMA_RECONNECT_MULTIPLIER", &v)?;
                if !m.is_finite() || m < 1.0 {
                    return Err(invalid("GAMMA_RECONNECT_MULTIPLIER", &v));
                }
                m
            }
            None => 1.0,
        };

        let player = var("GAMMA_PLAYER").unwrap_or_else(|| DEFAULT_PLAYER.into());
        let software_engine = match var("GAMMA_SOFTWARE_ENGINE") {
            Some(v) => parse_bool("GAMMA_SOFTWARE_ENGINE", &v)?,
            None => true,
        };
        let max_bandwidth = var("GAMMA_MAX_BANDWIDTH")
            .map(|v| parse("GAMMA_MAX_BANDWIDTH", &v))
            .transpose()?;

        let credentials = match (var("GAMMA_USERNAME"), lookup("GAMMA_PASSWORD")) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };

        Ok(Self {
            api_url,
            ws_url,
            request_timeout,
            reconnect: ReconnectConfig::exponential(delay, max_delay, multiplier),
            player,
            software_engine,
            max_bandwidth,
            credentials,
        })
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}
