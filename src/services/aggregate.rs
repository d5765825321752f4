// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Weekly aggregation of activities and their weather.
//!
//! Weeks are ISO weeks (Monday start) of the activity-local date. The output
//! is dense: every week in the window appears, oldest first, even with no
//! activities. Records are summed in (start time, id) order so the result
//! does not depend on input order.

use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

use crate::models::activity::pace_secs_per_km;
use crate::models::summary::{METERS_TO_FEET, METERS_TO_MILES};
use crate::models::{ActivityRecord, ConditionBreakdown, OverallSummary, WeeklySummary};
use crate::time_utils::week_start;

/// Date range `[first Monday, Monday after the current week)` covering the
/// `week_count` weeks that end with the week containing `today`.
///
/// A zero `week_count` is treated as one week.
pub fn week_window(today: NaiveDate, week_count: u32) -> (NaiveDate, NaiveDate) {
    let current = week_start(today);
    let first = current - Duration::weeks(i64::from(week_count.max(1) - 1));
    (first, current + Duration::weeks(1))
}

#[derive(Default)]
struct ConditionTotals {
    count: u32,
    distance: f64,
    moving_secs: u64,
    temperature_sum: f64,
    precipitation: f64,
}

#[derive(Default)]
struct WeekTotals<'a> {
    records: Vec<&'a ActivityRecord>,
}

impl WeekTotals<'_> {
    fn summarize(mut self, week_start: NaiveDate) -> WeeklySummary {
        self.records.sort_by_key(|r| (r.activity().start_time, r.activity().id));

        let mut distance = 0.0;
        let mut elevation = 0.0;
        let mut moving_secs = 0u64;
        let mut elapsed_secs = 0u64;
        let mut by_sport: BTreeMap<String, u32> = BTreeMap::new();
        let mut by_condition: BTreeMap<&str, ConditionTotals> = BTreeMap::new();
        let mut temperature_sum = 0.0;
        let mut enriched = 0u32;

        for record in &self.records {
            let activity = record.activity();
            distance += activity.distance_meters;
            elevation += activity.elevation_gain_meters;
            moving_secs += activity.duration_secs;
            elapsed_secs += activity.elapsed_secs;
            *by_sport.entry(activity.sport_type.clone()).or_default() += 1;

            if let Some(weather) = record.weather() {
                enriched += 1;
                temperature_sum += weather.temperature;

                let totals = by_condition
                    .entry(weather.condition_code.as_str())
                    .or_default();
                totals.count += 1;
                totals.distance += activity.distance_meters;
                totals.moving_secs += activity.duration_secs;
                totals.temperature_sum += weather.temperature;
                totals.precipitation += weather.precipitation;
            }
        }

        // Ascending iteration with a strict comparison keeps the smallest
        // code on ties.
        let mut dominant: Option<(&str, f64)> = None;
        for (condition, totals) in &by_condition {
            if dominant.map_or(true, |(_, best)| totals.distance > best) {
                dominant = Some((*condition, totals.distance));
            }
        }

        let conditions = by_condition
            .iter()
            .map(|(condition, totals)| ConditionBreakdown {
                condition: condition.to_string(),
                activity_count: totals.count,
                total_distance_meters: totals.distance,
                average_pace_secs_per_km: pace_secs_per_km(totals.moving_secs, totals.distance),
                mean_temperature: totals.temperature_sum / f64::from(totals.count),
                total_precipitation: totals.precipitation,
            })
            .collect();

        WeeklySummary {
            week_start,
            week_end: week_start + Duration::days(6),
            activity_count: self.records.len() as u32,
            enriched_count: enriched,
            total_distance_meters: distance,
            total_distance_miles: distance * METERS_TO_MILES,
            total_elevation_meters: elevation,
            total_elevation_feet: elevation * METERS_TO_FEET,
            total_moving_time_secs: moving_secs,
            total_elapsed_time_secs: elapsed_secs,
            average_pace_secs_per_km: pace_secs_per_km(moving_secs, distance),
            activities_by_sport: by_sport,
            dominant_weather_condition: dominant.map(|(condition, _)| condition.to_string()),
            mean_temperature: (enriched > 0).then(|| temperature_sum / f64::from(enriched)),
            conditions,
        }
    }
}

/// Summaries for the `week_count` weeks ending with the week of `today`.
///
/// Records dated outside the window are ignored.
pub fn aggregate(
    records: &[ActivityRecord],
    week_count: u32,
    today: NaiveDate,
) -> Vec<WeeklySummary> {
    if week_count == 0 {
        return Vec::new();
    }

    let (first, end) = week_window(today, week_count);
    let mut weeks: BTreeMap<NaiveDate, WeekTotals> = (0..week_count)
        .map(|i| (first + Duration::weeks(i64::from(i)), WeekTotals::default()))
        .collect();

    for record in records {
        let date = record.activity().local_date();
        if date < first || date >= end {
            tracing::debug!(activity_id = record.activity().id, date = %date, "Activity outside aggregation window");
            continue;
        }
        if let Some(week) = weeks.get_mut(&week_start(date)) {
            week.records.push(record);
        }
    }

    weeks
        .into_iter()
        .map(|(start, totals)| totals.summarize(start))
        .collect()
}

/// Totals across `weeks`, summed oldest week first.
pub fn overall(weeks: &[WeeklySummary]) -> OverallSummary {
    let mut totals = weeks.iter().fold(OverallSummary::default(), |mut acc, week| {
        acc.activity_count += week.activity_count;
        acc.enriched_count += week.enriched_count;
        acc.total_distance_meters += week.total_distance_meters;
        acc.total_elevation_meters += week.total_elevation_meters;
        acc.total_moving_time_secs += week.total_moving_time_secs;
        acc.total_elapsed_time_secs += week.total_elapsed_time_secs;
        for (sport, count) in &week.activities_by_sport {
            *acc.activities_by_sport.entry(sport.clone()).or_default() += count;
        }
        acc
    });

    totals.total_distance_miles = totals.total_distance_meters * METERS_TO_MILES;
    totals.average_pace_secs_per_km =
        pace_secs_per_km(totals.total_moving_time_secs, totals.total_distance_meters);
    totals
}
