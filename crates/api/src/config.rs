//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use saga::ScopeConfig;
use service_desk::ClientConfig;
use thiserror::Error;
use ticketing::AllowedCategories;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Server configuration.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `8080`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL URL; the in-memory store is used when unset
/// - `JWT_SECRET` — token signing secret (required)
/// - `SERVICE_DESK_BASE_URL`, `SERVICE_DESK_USERNAME`,
///   `SERVICE_DESK_PASSWORD` — service desk endpoint and credentials (required)
/// - `SERVICE_DESK_TIMEOUT_SECS` — per-attempt timeout (default: `15`)
/// - `SERVICE_DESK_COMPANY_ID`, `SERVICE_DESK_GROUP_ID`,
///   `SERVICE_DESK_LOCATION_ID` — scopes new users join (defaults: `135`,
///   `134`, `136`; `0` skips a scope)
/// - `SERVICE_DESK_ALLOWED_CATEGORIES` — comma-separated category ids
///   (default: `115` to `123`)
/// - `TOKEN_SWEEP_INTERVAL_SECS` — revocation sweep period (default: `3600`)
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub service_desk: ClientConfig,
    pub scopes: ScopeConfig,
    pub allowed_categories: AllowedCategories,
    pub sweep_interval: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("jwt_secret", &"<redacted>")
            .field("service_desk", &self.service_desk)
            .field("scopes", &self.scopes)
            .field("allowed_categories", &self.allowed_categories)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let parsed = |key: &'static str, default: i64| parse_or(get(key), key, default);

        let mut service_desk = ClientConfig::new(
            required("SERVICE_DESK_BASE_URL")?,
            required("SERVICE_DESK_USERNAME")?,
            required("SERVICE_DESK_PASSWORD")?,
        );
        service_desk.timeout = Duration::from_secs(parse_or(
            get("SERVICE_DESK_TIMEOUT_SECS"),
            "SERVICE_DESK_TIMEOUT_SECS",
            15,
        )?);

        let allowed_categories = match get("SERVICE_DESK_ALLOWED_CATEGORIES") {
            Some(raw) => parse_id_list(&raw, "SERVICE_DESK_ALLOWED_CATEGORIES")?,
            None => AllowedCategories::default(),
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(get("PORT"), "PORT", 8080)?,
            log_level: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            database_url: get("DATABASE_URL"),
            jwt_secret: required("JWT_SECRET")?,
            service_desk,
            scopes: ScopeConfig {
                company_id: parsed("SERVICE_DESK_COMPANY_ID", 135)?,
                group_id: parsed("SERVICE_DESK_GROUP_ID", 134)?,
                location_id: parsed("SERVICE_DESK_LOCATION_ID", 136)?,
            },
            allowed_categories,
            sweep_interval: Duration::from_secs(parse_or(
                get("TOKEN_SWEEP_INTERVAL_SECS"),
                "TOKEN_SWEEP_INTERVAL_SECS",
                3600,
            )?),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: FromStr>(
    value: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn parse_id_list(raw: &str, key: &'static str) -> Result<AllowedCategories, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<i64>().map_err(|_| ConfigError::Invalid {
                key,
                value: raw.to_string(),
            })
        })
        .collect()
}
