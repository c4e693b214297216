use std::time::Duration;

use crate::reconcile::ReconcileConfig;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

const API_URL_ENV: &str = "BRIGHTPATH_API_URL";
const REQUEST_TIMEOUT_SECS_ENV: &str = "BRIGHTPATH_REQUEST_TIMEOUT_SECS";
const RECONCILE_BACKOFF_MS_ENV: &str = "BRIGHTPATH_RECONCILE_BACKOFF_MS";
const RECONCILE_WINDOW_SECS_ENV: &str = "BRIGHTPATH_RECONCILE_WINDOW_SECS";
const RECONCILE_LOOKBEHIND_SECS_ENV: &str = "BRIGHTPATH_RECONCILE_LOOKBEHIND_SECS";
const AMOUNT_EPSILON_ENV: &str = "BRIGHTPATH_AMOUNT_EPSILON";
const LOGIN_ROUTE_ENV: &str = "BRIGHTPATH_LOGIN_ROUTE";

const REQUEST_TIMEOUT_SECS_DEFAULT: u64 = 30;
const REQUEST_TIMEOUT_SECS_MIN: u64 = 1;
const REQUEST_TIMEOUT_SECS_MAX: u64 = 300;
const RECONCILE_BACKOFF_MS_MAX: u64 = 30_000;
const RECONCILE_WINDOW_SECS_MIN: u64 = 1;
const RECONCILE_WINDOW_SECS_MAX: u64 = 300;
const RECONCILE_LOOKBEHIND_SECS_MAX: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid API base URL '{value}': {reason}")]
    InvalidBaseUrl { value: String, reason: String },
    #[error("{name} must be a non-negative number, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}

/// Runtime settings of the request layer.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL without trailing slash; every request goes to `{api_url}{path}`.
    pub api_url: String,
    pub request_timeout: Duration,
    /// Route of the login surface the executor redirects to on 401.
    pub login_route: String,
    pub reconcile: ReconcileConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS_DEFAULT),
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_url = match lookup(API_URL_ENV) {
            Some(raw) => normalize_base_url(&raw)?,
            None => defaults.api_url,
        };
        let timeout_secs = parse_env_u64_with_bounds(
            REQUEST_TIMEOUT_SECS_ENV,
            lookup(REQUEST_TIMEOUT_SECS_ENV),
            REQUEST_TIMEOUT_SECS_MIN,
            REQUEST_TIMEOUT_SECS_MAX,
            REQUEST_TIMEOUT_SECS_DEFAULT,
        )?;
        let backoff_ms = parse_env_u64_with_bounds(
            RECONCILE_BACKOFF_MS_ENV,
            lookup(RECONCILE_BACKOFF_MS_ENV),
            0,
            RECONCILE_BACKOFF_MS_MAX,
            defaults.reconcile.backoff.as_millis() as u64,
        )?;
        let window_secs = parse_env_u64_with_bounds(
            RECONCILE_WINDOW_SECS_ENV,
            lookup(RECONCILE_WINDOW_SECS_ENV),
            RECONCILE_WINDOW_SECS_MIN,
            RECONCILE_WINDOW_SECS_MAX,
            defaults.reconcile.lookahead.num_seconds() as u64,
        )?;
        let lookbehind_secs = parse_env_u64_with_bounds(
            RECONCILE_LOOKBEHIND_SECS_ENV,
            lookup(RECONCILE_LOOKBEHIND_SECS_ENV),
            0,
            RECONCILE_LOOKBEHIND_SECS_MAX,
            defaults.reconcile.lookbehind.num_seconds() as u64,
        )?;
        let epsilon = match lookup(AMOUNT_EPSILON_ENV) {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() && value >= 0.0 => value,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        name: AMOUNT_EPSILON_ENV,
                        value: raw,
                    });
                }
            },
            None => defaults.reconcile.epsilon,
        };
        let login_route = lookup(LOGIN_ROUTE_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.login_route);

        Ok(Self {
            api_url,
            request_timeout: Duration::from_secs(timeout_secs),
            login_route,
            reconcile: ReconcileConfig {
                backoff: Duration::from_millis(backoff_ms),
                lookahead: chrono::Duration::seconds(window_secs as i64),
                lookbehind: chrono::Duration::seconds(lookbehind_secs as i64),
                epsilon,
            },
        })
    }

    pub fn with_api_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.api_url = normalize_base_url(raw)?;
        Ok(self)
    }
}

/// Validate an absolute http(s) URL and drop the trailing slash.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let parsed = url::Url::parse(trimmed).map_err(|e| ConfigError::InvalidBaseUrl {
        value: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            value: trimmed.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(ConfigError::InvalidBaseUrl {
            value: trimmed.to_string(),
            reason: "base URL must not carry a query or fragment".to_string(),
        });
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn parse_env_u64_with_bounds(
    name: &'static str,
    raw: Option<String>,
    min: u64,
    max: u64,
    default: u64,
) -> Result<u64, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(|parsed| parsed.clamp(min, max))
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        None => Ok(default),
    }
}
