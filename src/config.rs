// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Credentials for the tracking service are read once at startup. The
//! authorization code (and optionally a refresh token from an earlier session)
//! is supplied out-of-band by the operator.

use std::env;
use std::time::Duration;

/// Default OAuth scope requested from Strava.
pub const DEFAULT_SCOPE: &str = "read,activity:read_all";

/// Default redirect URI registered with the Strava application.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost/exchange_token";

/// Strava REST API base URL.
pub const STRAVA_API_URL: &str = "https://www.strava.com/api/v3";

/// Strava OAuth base URL (`/authorize` and `/token` live below it).
pub const STRAVA_OAUTH_URL: &str = "https://www.strava.com/oauth";

/// Open-Meteo historical archive base URL.
pub const WEATHER_API_URL: &str = "https://archive-api.open-meteo.com";

/// Which wire protocol exposes the tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Stdio,
}

impl std::str::FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "streamable-http" => Ok(Transport::Http),
            "stdio" => Ok(Transport::Stdio),
            _ => Err(ConfigError::Invalid("TRANSPORT", s.to_string())),
        }
    }
}

/// Unit system for weather values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl std::str::FromStr for UnitSystem {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metric" => Ok(UnitSystem::Metric),
            "imperial" => Ok(UnitSystem::Imperial),
            _ => Err(ConfigError::Invalid("WEATHER_UNITS", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Clone)]
pub struct Config {
    // --- Strava application ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Requested OAuth scope
    pub strava_scope: String,
    /// Redirect URI used in the authorization URL
    pub strava_redirect_uri: String,
    /// Authorization code obtained out-of-band
    pub strava_auth_code: Option<String>,
    /// Refresh token carried over from an earlier session
    pub strava_refresh_token: Option<String>,
    pub strava_api_url: String,
    pub strava_oauth_url: String,

    // --- Weather provider ---
    pub weather_api_url: String,
    pub weather_units: UnitSystem,

    // --- Runtime ---
    /// Timeout applied to every outbound HTTP request
    pub http_timeout: Duration,
    pub transport: Transport,
    /// Server port (HTTP transport only)
    pub port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("strava_client_id", &self.strava_client_id)
            .field("strava_client_secret", &"<redacted>")
            .field("strava_scope", &self.strava_scope)
            .field("strava_auth_code", &self.strava_auth_code.as_ref().map(|_| "<set>"))
            .field(
                "strava_refresh_token",
                &self.strava_refresh_token.as_ref().map(|_| "<set>"),
            )
            .field("weather_units", &self.weather_units)
            .field("transport", &self.transport)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            strava_client_secret: "test_secret".to_string(),
            strava_scope: DEFAULT_SCOPE.to_string(),
            strava_redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            strava_auth_code: None,
            strava_refresh_token: None,
            strava_api_url: STRAVA_API_URL.to_string(),
            strava_oauth_url: STRAVA_OAUTH_URL.to_string(),
            weather_api_url: WEATHER_API_URL.to_string(),
            weather_units: UnitSystem::Metric,
            http_timeout: Duration::from_secs(30),
            transport: Transport::Http,
            port: 8080,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local runs.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            strava_scope: env::var("STRAVA_SCOPE").unwrap_or_else(|_| DEFAULT_SCOPE.to_string()),
            strava_redirect_uri: env::var("STRAVA_REDIRECT_URI")
                .unwrap_or_else(|_| DEFAULT_REDIRECT_URI.to_string()),
            strava_auth_code: optional_var("STRAVA_AUTH_CODE"),
            strava_refresh_token: optional_var("STRAVA_REFRESH_TOKEN"),
            strava_api_url: env::var("STRAVA_API_URL")
                .unwrap_or_else(|_| STRAVA_API_URL.to_string()),
            strava_oauth_url: env::var("STRAVA_OAUTH_URL")
                .unwrap_or_else(|_| STRAVA_OAUTH_URL.to_string()),

            weather_api_url: env::var("WEATHER_API_URL")
                .unwrap_or_else(|_| WEATHER_API_URL.to_string()),
            weather_units: match optional_var("WEATHER_UNITS") {
                Some(raw) => raw.parse()?,
                None => UnitSystem::Metric,
            },

            http_timeout: Duration::from_secs(
                env::var("HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            transport: match optional_var("TRANSPORT") {
                Some(raw) => raw.parse()?,
                None => Transport::Http,
            },
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        })
    }
}

/// Read an environment variable, treating blank values as unset.
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("STRAVA_CLIENT_ID", "test_id");
        env::set_var("STRAVA_CLIENT_SECRET", " test_secret\n");
        env::set_var("STRAVA_AUTH_CODE", "   ");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.strava_client_id, "test_id");
        assert_eq!(config.strava_client_secret, "test_secret");
        assert_eq!(config.strava_auth_code, None);
        assert_eq!(config.strava_scope, DEFAULT_SCOPE);
    }

    #[test]
    fn test_transport_parsing() {
        assert_eq!("stdio".parse::<Transport>().unwrap(), Transport::Stdio);
        assert_eq!("HTTP".parse::<Transport>().unwrap(), Transport::Http);
        assert!("pigeon".parse::<Transport>().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = Config {
            strava_client_secret: "super-secret".to_string(),
            ..Config::default()
        };
        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
