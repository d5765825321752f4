// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bounded exponential backoff shared by the outbound API clients.

use std::time::Duration;

/// Cap on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each time
    pub initial_backoff: Duration,
}

impl RetryConfig {
    /// Strava: rate limits reset on a 15-minute window, so back off generously.
    pub const fn strava() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
        }
    }

    pub const fn weather() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}
