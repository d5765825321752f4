// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Extracts the location and local date to look weather up for.

use chrono::{DateTime, NaiveDate, Utc};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::Activity;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationTime {
    pub latitude: f64,
    pub longitude: f64,
    /// Activity-local calendar date
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
}

/// Resolve where and when an activity happened.
///
/// Fails with `MissingLocation` for activities without usable start
/// coordinates (indoor rides, treadmill runs, privacy zones).
pub fn resolve(activity: &Activity) -> Result<LocationTime> {
    let (Some(latitude), Some(longitude)) = (activity.start_latitude, activity.start_longitude)
    else {
        return Err(AppError::MissingLocation(activity.id));
    };

    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        tracing::warn!(
            activity_id = activity.id,
            latitude,
            longitude,
            "Activity start coordinates out of range"
        );
        return Err(AppError::MissingLocation(activity.id));
    }

    Ok(LocationTime {
        latitude,
        longitude,
        date: activity.local_date(),
        start_time: activity.start_time,
        duration: Duration::from_secs(activity.duration_secs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activity(latlng: serde_json::Value) -> Activity {
        Activity::from_payload(json!({
            "id": 7,
            "name": "Late Run",
            "sport_type": "Run",
            "start_date": "2024-03-02T04:30:00Z",
            "start_date_local": "2024-03-01T22:30:00Z",
            "moving_time": 1800,
            "distance": 5000.0,
            "start_latlng": latlng
        }))
        .unwrap()
    }

    #[test]
    fn test_resolve_uses_local_date() {
        let resolved = resolve(&activity(json!([41.8781, -87.6298]))).unwrap();
        assert_eq!(resolved.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(resolved.latitude, 41.8781);
        assert_eq!(resolved.duration, Duration::from_secs(1800));
    }

    #[test]
    fn test_missing_coordinates() {
        for latlng in [json!([]), json!(null)] {
            let err = resolve(&activity(latlng)).unwrap_err();
            assert!(matches!(err, AppError::MissingLocation(7)));
        }
    }

    #[test]
    fn test_out_of_range_coordinates() {
        let err = resolve(&activity(json!([91.0, 10.0]))).unwrap_err();
        assert!(matches!(err, AppError::MissingLocation(7)));
    }
}
