// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod aggregate;
pub mod credentials;
pub mod pipeline;
pub mod resolver;
pub mod retry;
pub mod strava;
pub mod weather;

pub use credentials::{AuthorizationCodeSource, CredentialManager, OutOfBandCode};
pub use pipeline::Pipeline;
pub use retry::RetryConfig;
pub use strava::{ClientCredentials, StravaClient, StravaService};
pub use weather::{WeatherCache, WeatherClient, WeatherService};
