//! Client Configuration Settings
//!
//! Configuration for the market data client, loaded from environment
//! variables. Unset variables take their defaults; malformed values are
//! errors.

use std::time::Duration;

use reqwest::Url;

use crate::domain::pagination::{Cursor, LimitConfig};
use crate::infrastructure::alpaca::DEFAULT_HTTP_TIMEOUT;
use crate::infrastructure::stream::Backend;

/// Default REST base URL.
pub const DEFAULT_DATA_URL: &str = "https://data.alpaca.markets";

/// Default stream URL.
pub const DEFAULT_STREAM_URL: &str = "wss://stream.data.alpaca.markets/v2/sip";

/// Alpaca API credentials.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the API secret.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Pagination defaults applied to every call made from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationSettings {
    /// Caller limits.
    pub limits: LimitConfig,
    /// Cursor to resume from.
    pub page_token: Cursor,
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL.
    pub data_url: Url,
    /// Stream URL.
    pub stream_url: String,
    /// Streaming backend.
    pub backend: Backend,
    /// Pagination defaults.
    pub pagination: PaginationSettings,
    /// HTTP request timeout.
    pub http_timeout: Duration,
    /// API credentials, when present.
    pub credentials: Option<Credentials>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_url: default_data_url(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            backend: Backend::default(),
            pagination: PaginationSettings::default(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            credentials: None,
        }
    }
}

#[allow(clippy::expect_used)]
fn default_data_url() -> Url {
    Url::parse(DEFAULT_DATA_URL).expect("static default data url is valid")
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a malformed value, or only
    /// one of the credential pair is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_url = match get("ALPACA_DATA_URL") {
            Some(raw) => parse_base_url("ALPACA_DATA_URL", &raw)?,
            None => defaults.data_url,
        };

        let stream_url = get("ALPACA_STREAM_URL").unwrap_or(defaults.stream_url);

        let backend = match get("MARKETDATA_WS_BACKEND") {
            Some(raw) => raw
                .trim()
                .parse::<Backend>()
                .map_err(|_| ConfigError::invalid("MARKETDATA_WS_BACKEND", &raw))?,
            None => defaults.backend,
        };

        let limits = LimitConfig {
            total_limit: parse_var(&get, "MARKETDATA_TOTAL_LIMIT", 0)?,
            page_limit: parse_var(&get, "MARKETDATA_PAGE_LIMIT", 0)?,
            no_total_limit: parse_bool(&get, "MARKETDATA_NO_TOTAL_LIMIT", false)?,
        };
        let page_token = get("MARKETDATA_PAGE_TOKEN")
            .map(Cursor::from)
            .unwrap_or_default();

        let http_timeout = Duration::from_secs(parse_var(
            &get,
            "MARKETDATA_HTTP_TIMEOUT_SECS",
            defaults.http_timeout.as_secs(),
        )?);

        let credentials = match (get("ALPACA_KEY"), get("ALPACA_SECRET")) {
            (Some(key), Some(secret)) => Some(Credentials::new(key, secret)),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("ALPACA_SECRET".to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("ALPACA_KEY".to_string())),
        };

        Ok(Self {
            data_url,
            stream_url,
            backend,
            pagination: PaginationSettings { limits, page_token },
            http_timeout,
            credentials,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    match Url::parse(raw.trim()) {
        Ok(url) if !url.cannot_be_a_base() && matches!(url.scheme(), "http" | "https") => Ok(url),
        _ => Err(ConfigError::invalid(key, raw)),
    }
}

fn parse_var<G, T>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    get(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|_| ConfigError::invalid(key, &raw))
    })
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(key).map_or(Ok(default), |raw| match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::invalid(key, &raw)),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.data_url.as_str(), "https://data.alpaca.markets/");
        assert_eq!(config.stream_url, DEFAULT_STREAM_URL);
        assert_eq!(config.backend, Backend::Tungstenite);
        assert_eq!(config.pagination, PaginationSettings::default());
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert!(config.credentials.is_none());
    }

    #[test]
    fn reads_pagination_knobs() {
        let config = config_from(&[
            ("MARKETDATA_TOTAL_LIMIT", "500"),
            ("MARKETDATA_PAGE_LIMIT", "100"),
            ("MARKETDATA_PAGE_TOKEN", "tok1"),
            ("MARKETDATA_WS_BACKEND", "socket"),
        ])
        .unwrap();

        assert_eq!(config.pagination.limits, LimitConfig::total(500).with_page_limit(100));
        assert_eq!(config.pagination.page_token, Cursor::new("tok1"));
        assert_eq!(config.backend, Backend::Socket);
    }

    #[test]
    fn negative_limits_survive_to_validation() {
        let config = config_from(&[("MARKETDATA_TOTAL_LIMIT", "-1")]).unwrap();
        assert!(config.pagination.limits.validate(None).is_err());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = config_from(&[("MARKETDATA_WS_BACKEND", "unknown-x")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MARKETDATA_WS_BACKEND"));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(config_from(&[("MARKETDATA_PAGE_LIMIT", "ten")]).is_err());
        assert!(config_from(&[("MARKETDATA_NO_TOTAL_LIMIT", "maybe")]).is_err());
        assert!(config_from(&[("ALPACA_DATA_URL", "not a url")]).is_err());
        assert!(config_from(&[("ALPACA_DATA_URL", "wss://data.example.com")]).is_err());
    }

    #[test]
    fn credentials_must_come_in_pairs() {
        let err = config_from(&[("ALPACA_KEY", "key")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref var) if var == "ALPACA_SECRET"));

        let config = config_from(&[("ALPACA_KEY", "key"), ("ALPACA_SECRET", "secret")]).unwrap();
        assert_eq!(config.credentials.unwrap().api_key(), "key");
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("key123".to_string(), "secret456".to_string());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
    }
}
