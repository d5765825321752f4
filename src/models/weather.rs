// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Historical weather observation and its cache key.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::UnitSystem;

/// Coordinates are snapped to 1/GRID_SCALE degrees (0.01°, roughly 1 km).
pub const GRID_SCALE: f64 = 100.0;

/// Cache key: rounded location plus local calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeatherKey {
    lat_cells: i32,
    lon_cells: i32,
    pub date: NaiveDate,
}

impl WeatherKey {
    pub fn new(latitude: f64, longitude: f64, date: NaiveDate) -> Self {
        Self {
            lat_cells: (latitude * GRID_SCALE).round() as i32,
            lon_cells: (longitude * GRID_SCALE).round() as i32,
            date,
        }
    }

    pub fn latitude(&self) -> f64 {
        f64::from(self.lat_cells) / GRID_SCALE
    }

    pub fn longitude(&self) -> f64 {
        f64::from(self.lon_cells) / GRID_SCALE
    }
}

/// Daily weather aggregates at a rounded location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub latitude: f64,
    pub longitude: f64,
    pub date: NaiveDate,
    /// Daily mean temperature
    pub temperature: f64,
    pub temperature_max: Option<f64>,
    pub temperature_min: Option<f64>,
    /// Daily precipitation sum
    pub precipitation: f64,
    /// Daily maximum wind speed
    pub wind_speed: f64,
    /// WMO weather interpretation code
    pub weather_code: u8,
    /// Coarse condition label derived from `weather_code`
    pub condition_code: String,
    pub units: UnitSystem,
}

/// Map a WMO weather interpretation code to a coarse condition label.
pub fn condition_from_wmo(code: u8) -> &'static str {
    match code {
        0 => "clear",
        1 | 2 => "partly_cloudy",
        3 => "overcast",
        45 | 48 => "fog",
        51..=57 => "drizzle",
        61..=67 | 80..=82 => "rain",
        71..=77 | 85 | 86 => "snow",
        95..=99 => "thunderstorm",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearby_points_share_key() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let a = WeatherKey::new(41.8781, -87.6298, date);
        let b = WeatherKey::new(41.8802, -87.6340, date);
        assert_eq!(a, b);
        assert_eq!(a.latitude(), 41.88);
        assert_eq!(a.longitude(), -87.63);
    }

    #[test]
    fn test_different_date_different_key() {
        let a = WeatherKey::new(41.88, -87.63, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let b = WeatherKey::new(41.88, -87.63, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn test_condition_labels() {
        assert_eq!(condition_from_wmo(0), "clear");
        assert_eq!(condition_from_wmo(63), "rain");
        assert_eq!(condition_from_wmo(81), "rain");
        assert_eq!(condition_from_wmo(73), "snow");
        assert_eq!(condition_from_wmo(200), "unknown");
    }
}
