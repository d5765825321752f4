// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Historical weather lookups against the Open-Meteo archive API.
//!
//! Lookups are cached per rounded location and local date. Concurrent misses
//! on the same key wait on a per-key lock so only one upstream request is made.

use chrono::NaiveDate;
use dashmap::DashMap;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{Config, UnitSystem};
use crate::error::{AppError, Result};
use crate::models::weather::condition_from_wmo;
use crate::models::{WeatherKey, WeatherObservation};
use crate::services::retry::RetryConfig;

/// Daily variables requested from the archive endpoint.
const DAILY_FIELDS: &str = "temperature_2m_mean,temperature_2m_max,temperature_2m_min,\
                            precipitation_sum,wind_speed_10m_max,weather_code";

/// Observations keyed by rounded location and date.
///
/// Only successful lookups are stored.
#[derive(Default)]
pub struct WeatherCache {
    entries: DashMap<WeatherKey, WeatherObservation>,
    locks: DashMap<WeatherKey, Arc<Mutex<()>>>,
}

impl WeatherCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &WeatherKey) -> Option<WeatherObservation> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, key: WeatherKey, observation: WeatherObservation) {
        self.entries.insert(key, observation);
    }

    fn lock_for(&self, key: WeatherKey) -> Arc<Mutex<()>> {
        // Clone the Arc out so the shard guard is released before awaiting.
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the key lock once no other lookup holds or waits on it.
    fn release_lock(&self, key: &WeatherKey, lock: &Arc<Mutex<()>>) {
        // Two references: the map entry and the caller's clone.
        self.locks
            .remove_if(key, |_, held| Arc::ptr_eq(held, lock) && Arc::strong_count(lock) == 2);
    }
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    daily: DailySeries,
}

#[derive(Debug, Default, Deserialize)]
struct DailySeries {
    #[serde(default)]
    time: Vec<NaiveDate>,
    #[serde(default)]
    temperature_2m_mean: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m_max: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<u8>>,
}

fn first<T: Copy>(series: &[Option<T>]) -> Option<T> {
    series.first().copied().flatten()
}

/// HTTP client for the weather archive.
#[derive(Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    api_url: String,
    units: UnitSystem,
    retry: RetryConfig,
}

impl WeatherClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_url: config.weather_api_url.trim_end_matches('/').to_string(),
            units: config.weather_units,
            retry: RetryConfig::weather(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Daily observation for one location and date.
    pub async fn fetch_daily(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
    ) -> Result<WeatherObservation> {
        let url = format!("{}/v1/archive", self.api_url);
        let day = date.format("%Y-%m-%d").to_string();
        let mut query = vec![
            ("latitude", format!("{:.2}", latitude)),
            ("longitude", format!("{:.2}", longitude)),
            ("start_date", day.clone()),
            ("end_date", day),
            ("daily", DAILY_FIELDS.to_string()),
            ("timezone", "auto".to_string()),
        ];
        if self.units == UnitSystem::Imperial {
            query.push(("temperature_unit", "fahrenheit".to_string()));
            query.push(("wind_speed_unit", "mph".to_string()));
            query.push(("precipitation_unit", "inch".to_string()));
        }

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let failure = match self.http.get(&url).query(&query).send().await {
                Ok(response) if response.status().is_success() => break response,
                Ok(response) => {
                    let status = response.status();
                    if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(AppError::WeatherUnavailable(format!(
                            "HTTP {}: {}",
                            status, body
                        )));
                    }
                    format!("HTTP {}", status)
                }
                Err(e) if e.is_timeout() || e.is_connect() => e.to_string(),
                Err(e) => return Err(AppError::WeatherUnavailable(e.to_string())),
            };

            if attempt >= self.retry.max_attempts {
                tracing::warn!(attempts = attempt, error = %failure, "Weather lookup failed, giving up");
                return Err(AppError::WeatherUnavailable(format!(
                    "{} after {} attempts",
                    failure, attempt
                )));
            }

            let delay = self.retry.backoff(attempt);
            tracing::debug!(
                attempt,
                backoff_ms = delay.as_millis() as u64,
                error = %failure,
                "Transient weather failure, retrying"
            );
            tokio::time::sleep(delay).await;
        };

        let archive: ArchiveResponse = response
            .json()
            .await
            .map_err(|e| AppError::WeatherUnavailable(format!("JSON parse error: {}", e)))?;

        self.observation(latitude, longitude, date, archive.daily)
    }

    fn observation(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
        daily: DailySeries,
    ) -> Result<WeatherObservation> {
        if daily.time.first() != Some(&date) {
            return Err(AppError::WeatherUnavailable(format!(
                "no daily record for {}",
                date
            )));
        }

        let temperature_max = first(&daily.temperature_2m_max);
        let temperature_min = first(&daily.temperature_2m_min);
        let temperature = match (first(&daily.temperature_2m_mean), temperature_max, temperature_min) {
            (Some(mean), _, _) => mean,
            (None, Some(max), Some(min)) => (max + min) / 2.0,
            _ => {
                return Err(AppError::WeatherUnavailable(format!(
                    "no temperature recorded for {}",
                    date
                )))
            }
        };

        // WMO code range tops out at 99; 255 maps to "unknown".
        let weather_code = first(&daily.weather_code).unwrap_or(u8::MAX);

        Ok(WeatherObservation {
            latitude,
            longitude,
            date,
            temperature,
            temperature_max,
            temperature_min,
            precipitation: first(&daily.precipitation_sum).unwrap_or(0.0),
            wind_speed: first(&daily.wind_speed_10m_max).unwrap_or(0.0),
            weather_code,
            condition_code: condition_from_wmo(weather_code).to_string(),
            units: self.units,
        })
    }
}

/// Cached weather lookups.
#[derive(Clone)]
pub struct WeatherService {
    client: WeatherClient,
    cache: Arc<WeatherCache>,
}

impl WeatherService {
    pub fn new(client: WeatherClient, cache: Arc<WeatherCache>) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &Arc<WeatherCache> {
        &self.cache
    }

    /// Weather at the rounded location on `date`.
    pub async fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
    ) -> Result<WeatherObservation> {
        let key = WeatherKey::new(latitude, longitude, date);

        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(date = %date, "Weather cache hit");
            return Ok(hit);
        }

        let lock = self.cache.lock_for(key);
        let result = {
            let _guard = lock.lock().await;
            self.fetch_uncached(key, date).await
        };
        self.cache.release_lock(&key, &lock);
        result
    }

    async fn fetch_uncached(&self, key: WeatherKey, date: NaiveDate) -> Result<WeatherObservation> {
        // Another lookup may have filled the entry while we waited.
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(date = %date, "Weather cache filled while waiting");
            return Ok(hit);
        }

        let observation = self
            .client
            .fetch_daily(key.latitude(), key.longitude(), date)
            .await?;
        self.cache.insert(key, observation.clone());

        tracing::debug!(
            latitude = key.latitude(),
            longitude = key.longitude(),
            date = %date,
            condition = %observation.condition_code,
            "Weather fetched"
        );
        Ok(observation)
    }
}
