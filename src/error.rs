// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type shared by the pipeline, the tools and the HTTP
/// transport.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authorization request failed: {0}")]
    AuthRequest(String),

    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Refresh token revoked: {0}")]
    RefreshRevoked(String),

    #[error("Illegal credential transition: cannot {operation} from {state}")]
    IllegalTransition {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Authorization rejected after credential refresh")]
    Unauthorized,

    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("Activity {0} has no start location")]
    MissingLocation(u64),

    #[error("Weather unavailable: {0}")]
    WeatherUnavailable(String),

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("Strava API error: {0}")]
    StravaApi(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message carried by `StravaApi` when Strava answers 401.
    pub const STRAVA_TOKEN_ERROR: &'static str = "Strava rejected the access token";

    /// Whether this is the 401 signal that should trigger one refresh.
    pub fn is_strava_token_error(&self) -> bool {
        matches!(self, AppError::StravaApi(msg) if msg == Self::STRAVA_TOKEN_ERROR)
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::AuthRequest(_) => "auth_request_error",
            AppError::InvalidGrant(_) => "invalid_grant",
            AppError::RefreshRevoked(_) => "refresh_revoked",
            AppError::IllegalTransition { .. } => "illegal_transition",
            AppError::Unauthorized => "unauthorized",
            AppError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            AppError::MissingLocation(_) => "missing_location",
            AppError::WeatherUnavailable(_) => "weather_unavailable",
            AppError::NetworkTimeout(_) => "network_timeout",
            AppError::StravaApi(_) => "strava_error",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Whether a caller may retry the same operation after a delay.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RateLimitExceeded { .. }
                | AppError::NetworkTimeout(_)
                | AppError::WeatherUnavailable(_)
        )
    }

    /// Credential failures end the whole run.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            AppError::AuthRequest(_)
                | AppError::InvalidGrant(_)
                | AppError::RefreshRevoked(_)
                | AppError::IllegalTransition { .. }
                | AppError::Unauthorized
        )
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AuthRequest(_)
            | AppError::InvalidGrant(_)
            | AppError::RefreshRevoked(_)
            | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::IllegalTransition { .. } => StatusCode::CONFLICT,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::MissingLocation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::WeatherUnavailable(_) | AppError::StravaApi(_) => StatusCode::BAD_GATEWAY,
            AppError::NetworkTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured error descriptor returned across the tool boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ErrorDescriptor {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&AppError> for ErrorDescriptor {
    fn from(err: &AppError) -> Self {
        let message = match err {
            // Internal details stay in the logs.
            AppError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        Self {
            code: err.code().to_string(),
            message,
            retryable: err.is_retryable(),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: ErrorDescriptor,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(err) = &self {
            tracing::error!(error = %err, "Internal server error");
        }

        let body = ErrorResponse {
            ok: false,
            error: ErrorDescriptor::from(&self),
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
