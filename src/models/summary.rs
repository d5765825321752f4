// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Enriched activities and weekly correlation summaries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AppError;
use crate::models::{Activity, WeatherObservation};

pub const METERS_TO_MILES: f64 = 0.000621371;
pub const METERS_TO_FEET: f64 = 3.28084;

/// An activity joined with the weather on its local start date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedActivity {
    activity: Activity,
    weather: WeatherObservation,
}

impl EnrichedActivity {
    /// Join an activity with an observation. The observation date must be the
    /// activity's local calendar date.
    pub fn new(activity: Activity, weather: WeatherObservation) -> Result<Self, AppError> {
        if weather.date != activity.local_date() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "weather date {} does not match activity {} local date {}",
                weather.date,
                activity.id,
                activity.local_date()
            )));
        }
        Ok(Self { activity, weather })
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn weather(&self) -> &WeatherObservation {
        &self.weather
    }
}

/// Aggregator input: an activity with or without weather.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityRecord {
    Enriched(EnrichedActivity),
    Unenriched(Activity),
}

impl ActivityRecord {
    pub fn activity(&self) -> &Activity {
        match self {
            ActivityRecord::Enriched(e) => e.activity(),
            ActivityRecord::Unenriched(a) => a,
        }
    }

    pub fn weather(&self) -> Option<&WeatherObservation> {
        match self {
            ActivityRecord::Enriched(e) => Some(e.weather()),
            ActivityRecord::Unenriched(_) => None,
        }
    }
}

/// Performance under one weather condition within a week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionBreakdown {
    pub condition: String,
    pub activity_count: u32,
    pub total_distance_meters: f64,
    pub average_pace_secs_per_km: Option<f64>,
    pub mean_temperature: f64,
    pub total_precipitation: f64,
}

/// Statistics for one ISO week (Monday to Sunday).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub activity_count: u32,
    /// Activities carrying weather data
    pub enriched_count: u32,
    pub total_distance_meters: f64,
    pub total_distance_miles: f64,
    pub total_elevation_meters: f64,
    pub total_elevation_feet: f64,
    pub total_moving_time_secs: u64,
    pub total_elapsed_time_secs: u64,
    pub average_pace_secs_per_km: Option<f64>,
    pub activities_by_sport: BTreeMap<String, u32>,
    /// Condition with the most cumulative distance
    pub dominant_weather_condition: Option<String>,
    pub mean_temperature: Option<f64>,
    /// Ordered by condition label
    pub conditions: Vec<ConditionBreakdown>,
}

/// Why an activity is missing from the weather correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradationReason {
    MissingLocation,
    WeatherUnavailable { message: String },
    Cancelled,
    /// Retrieved, but its local date falls outside the requested weeks.
    /// Not counted in any week.
    OutsideWindow,
}

/// Accounting entry for an activity left out of the weather correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedActivity {
    pub activity_id: u64,
    pub reason: DegradationReason,
}

/// Totals across every week of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallSummary {
    pub activity_count: u32,
    pub enriched_count: u32,
    pub total_distance_meters: f64,
    pub total_distance_miles: f64,
    pub total_elevation_meters: f64,
    pub total_moving_time_secs: u64,
    pub total_elapsed_time_secs: u64,
    pub average_pace_secs_per_km: Option<f64>,
    pub activities_by_sport: BTreeMap<String, u32>,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub overall: OverallSummary,
    /// Oldest week first
    pub weeks: Vec<WeeklySummary>,
    pub degraded: Vec<DegradedActivity>,
}
