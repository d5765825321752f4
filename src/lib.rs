// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Activity-Weather: correlate Strava training with historical weather
//!
//! This crate manages the Strava OAuth credential, retrieves recent
//! activities, enriches them with daily weather from the Open-Meteo archive
//! and summarizes each week. The results are exposed as tools over HTTP or
//! line-delimited JSON on stdio.

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod stdio;
pub mod time_utils;
pub mod tools;

use config::Config;
use tools::ToolRouter;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub tools: ToolRouter,
}
