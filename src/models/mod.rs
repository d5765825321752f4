// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod credential;
pub mod summary;
pub mod weather;

pub use activity::Activity;
pub use credential::{AuthState, Credential};
pub use summary::{
    ActivityRecord, ConditionBreakdown, DegradationReason, DegradedActivity, EnrichedActivity,
    OverallSummary, PipelineReport, WeeklySummary,
};
pub use weather::{WeatherKey, WeatherObservation};
