// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use activity_weather::config::Config;
use activity_weather::routes::create_router;
use activity_weather::services::{
    CredentialManager, Pipeline, RetryConfig, StravaClient, StravaService, WeatherCache,
    WeatherClient, WeatherService,
};
use activity_weather::time_utils::FixedClock;
use activity_weather::tools::ToolRouter;
use activity_weather::AppState;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Friday 2024-03-08, 18:00 UTC.
#[allow(dead_code)]
pub fn test_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-08T18:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

#[allow(dead_code)]
pub fn test_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(test_now()))
}

/// Retry budgets with millisecond backoff.
#[allow(dead_code)]
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_backoff: std::time::Duration::from_millis(1),
    }
}

/// Config pointing both providers at mock servers.
#[allow(dead_code)]
pub fn test_config(strava: &MockServer, weather: &MockServer) -> Config {
    Config {
        strava_api_url: format!("{}/api/v3", strava.uri()),
        strava_oauth_url: format!("{}/oauth", strava.uri()),
        strava_auth_code: Some("test-code".to_string()),
        weather_api_url: weather.uri(),
        http_timeout: std::time::Duration::from_secs(5),
        ..Config::default()
    }
}

#[allow(dead_code)]
pub fn strava_client(config: &Config) -> StravaClient {
    StravaClient::new(config)
        .unwrap()
        .with_retry(fast_retry(RetryConfig::strava().max_attempts))
}

#[allow(dead_code)]
pub fn credential_manager(config: &Config, clock: Arc<FixedClock>) -> Arc<CredentialManager> {
    Arc::new(CredentialManager::from_config(
        config,
        strava_client(config),
        clock,
    ))
}

#[allow(dead_code)]
pub fn weather_service(config: &Config) -> WeatherService {
    let client = WeatherClient::new(config)
        .unwrap()
        .with_retry(fast_retry(RetryConfig::weather().max_attempts));
    WeatherService::new(client, Arc::new(WeatherCache::new()))
}

#[allow(dead_code)]
pub fn pipeline(config: &Config, clock: Arc<FixedClock>) -> Arc<Pipeline> {
    let credentials = credential_manager(config, clock.clone());
    let strava = StravaService::new(strava_client(config), credentials);
    Arc::new(Pipeline::new(strava, weather_service(config), clock))
}

/// Create a test app backed by mock providers.
#[allow(dead_code)]
pub fn create_test_app(config: Config, clock: Arc<FixedClock>) -> (axum::Router, Arc<AppState>) {
    let tools = ToolRouter::new(pipeline(&config, clock));
    let state = Arc::new(AppState { config, tools });
    (create_router(state.clone()), state)
}

/// Token grant body as Strava returns it.
#[allow(dead_code)]
pub fn token_json(access: &str, refresh: &str, expires_at: DateTime<Utc>) -> Value {
    json!({
        "token_type": "Bearer",
        "access_token": access,
        "refresh_token": refresh,
        "expires_at": expires_at.timestamp(),
        "expires_in": 21600
    })
}

/// Mount the authorization-code grant for `test-code`, issuing `access-1`.
#[allow(dead_code)]
pub async fn mount_code_exchange(strava: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=test-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json(
            "access-1",
            "refresh-1",
            test_now() + Duration::hours(6),
        )))
        .expect(expected_calls)
        .mount(strava)
        .await;
}

/// Mount a refresh grant that rotates `from` into `access`/`refresh`.
#[allow(dead_code)]
pub async fn mount_refresh(
    strava: &MockServer,
    from: &str,
    access: &str,
    refresh: &str,
    expires_at: DateTime<Utc>,
    expected_calls: u64,
) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains(format!("refresh_token={}", from)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json(access, refresh, expires_at)),
        )
        .expect(expected_calls)
        .mount(strava)
        .await;
}

/// A Strava summary activity in Chicago (UTC-6).
#[allow(dead_code)]
pub fn activity_json(id: u64, local: &str, distance: f64, latlng: Option<[f64; 2]>) -> Value {
    let local_time = DateTime::parse_from_rfc3339(&format!("{}Z", local))
        .unwrap()
        .with_timezone(&Utc);
    let start_utc = local_time + Duration::hours(6);

    json!({
        "id": id,
        "name": format!("Activity {}", id),
        "sport_type": "Run",
        "type": "Run",
        "start_date": start_utc.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        "start_date_local": format!("{}Z", local),
        "timezone": "(GMT-06:00) America/Chicago",
        "moving_time": (distance / 1000.0 * 300.0) as u64,
        "elapsed_time": (distance / 1000.0 * 330.0) as u64,
        "distance": distance,
        "total_elevation_gain": 12.0,
        "start_latlng": latlng.map(|ll| ll.to_vec()).unwrap_or_default()
    })
}

/// Open-Meteo archive body for one day.
#[allow(dead_code)]
pub fn weather_json(date: &str, code: u8, temperature: f64) -> Value {
    json!({
        "latitude": 41.88,
        "longitude": -87.63,
        "timezone": "America/Chicago",
        "daily_units": { "time": "iso8601", "temperature_2m_mean": "°C" },
        "daily": {
            "time": [date],
            "temperature_2m_mean": [temperature],
            "temperature_2m_max": [temperature + 4.0],
            "temperature_2m_min": [temperature - 4.0],
            "precipitation_sum": [0.0],
            "wind_speed_10m_max": [14.2],
            "weather_code": [code]
        }
    })
}
