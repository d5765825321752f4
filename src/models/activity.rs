// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Strava activity model, normalized from the provider payload.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Summary activity as returned by the Strava list and detail endpoints.
#[derive(Debug, Clone, Deserialize)]
struct StravaActivitySummary {
    id: u64,
    #[serde(default)]
    name: String,
    sport_type: Option<String>,
    #[serde(rename = "type")]
    activity_type: Option<String>,
    start_date: DateTime<Utc>,
    /// Local wall-clock time, rendered by Strava with a misleading `Z` suffix.
    start_date_local: Option<DateTime<Utc>>,
    timezone: Option<String>,
    #[serde(default)]
    moving_time: u64,
    #[serde(default)]
    elapsed_time: u64,
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    total_elevation_gain: f64,
    /// `[lat, lng]`, empty or null for indoor activities.
    #[serde(default)]
    start_latlng: Option<Vec<f64>>,
}

/// Normalized activity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Strava activity ID
    pub id: u64,
    /// Activity name/title
    pub name: String,
    /// Sport type (Ride, Run, Hike, etc.)
    pub sport_type: String,
    /// Start instant (UTC)
    pub start_time: DateTime<Utc>,
    /// Start as local wall-clock time at the activity location
    pub start_date_local: NaiveDateTime,
    /// Strava timezone label, e.g. "(GMT-08:00) America/Los_Angeles"
    pub timezone: Option<String>,
    /// Moving time in seconds
    pub duration_secs: u64,
    /// Elapsed time in seconds
    pub elapsed_secs: u64,
    /// Distance in meters
    pub distance_meters: f64,
    /// Elevation gain in meters
    pub elevation_gain_meters: f64,
    /// Seconds per kilometer; absent for zero-distance activities
    pub average_pace_secs_per_km: Option<f64>,
    pub start_latitude: Option<f64>,
    pub start_longitude: Option<f64>,
    /// Provider payload as received. Not serialized into tool output.
    #[serde(skip_serializing, default)]
    pub raw_payload: serde_json::Value,
}

impl Activity {
    /// Normalize a provider payload. The same payload always produces the
    /// same record.
    pub fn from_payload(payload: serde_json::Value) -> Result<Self, AppError> {
        let summary: StravaActivitySummary = serde_json::from_value(payload.clone())
            .map_err(|e| AppError::StravaApi(format!("Malformed activity payload: {}", e)))?;

        let (start_latitude, start_longitude) = match summary.start_latlng.as_deref() {
            Some([lat, lng]) => (Some(*lat), Some(*lng)),
            _ => (None, None),
        };

        let start_date_local = summary
            .start_date_local
            .unwrap_or(summary.start_date)
            .naive_utc();

        Ok(Self {
            id: summary.id,
            name: summary.name,
            sport_type: summary
                .sport_type
                .or(summary.activity_type)
                .unwrap_or_else(|| "Unknown".to_string()),
            start_time: summary.start_date,
            start_date_local,
            timezone: summary.timezone,
            duration_secs: summary.moving_time,
            elapsed_secs: summary.elapsed_time,
            distance_meters: summary.distance,
            elevation_gain_meters: summary.total_elevation_gain,
            average_pace_secs_per_km: pace_secs_per_km(summary.moving_time, summary.distance),
            start_latitude,
            start_longitude,
            raw_payload: payload,
        })
    }

    /// Calendar date in activity-local time.
    pub fn local_date(&self) -> NaiveDate {
        self.start_date_local.date()
    }
}

/// Pace from moving time and distance.
pub fn pace_secs_per_km(moving_secs: u64, distance_meters: f64) -> Option<f64> {
    if distance_meters > 0.0 && moving_secs > 0 {
        Some(moving_secs as f64 / (distance_meters / 1000.0))
    } else {
        None
    }
}
