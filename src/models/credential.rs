// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Delegated-authorization credential and its lifecycle states.
//!
//! `AuthState` is a tagged value. Transitions never mutate in place: each
//! returns the next state or an `IllegalTransition` error, and the caller
//! decides whether to store it.

use chrono::{DateTime, Duration, Utc};

use crate::error::AppError;

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// A live OAuth credential for the tracking service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub scope: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Credential {
    /// Expired, or close enough to expiry that an in-flight request could
    /// outlive it.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) >= self.expires_at
    }

    /// Placeholder credential for a session resumed from a refresh token
    /// only. It is born expired so the first use refreshes it.
    pub fn from_refresh_token(refresh_token: String, scope: String) -> Self {
        Self {
            access_token: String::new(),
            refresh_token,
            expires_at: DateTime::<Utc>::default(),
            scope,
        }
    }
}

/// Credential lifecycle states.
#[derive(Debug, Clone)]
pub enum AuthState {
    Unauthenticated,
    CodeIssued { code: String, scope: String },
    Active(Credential),
    Expired(Credential),
    Revoked,
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::CodeIssued { .. } => "code_issued",
            AuthState::Active(_) => "active",
            AuthState::Expired(_) => "expired",
            AuthState::Revoked => "revoked",
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        match self {
            AuthState::Active(c) | AuthState::Expired(c) => Some(c),
            _ => None,
        }
    }

    fn illegal(&self, operation: &'static str) -> AppError {
        AppError::IllegalTransition {
            operation,
            state: self.name(),
        }
    }

    /// `UNAUTHENTICATED | CODE_ISSUED | REVOKED → CODE_ISSUED`.
    ///
    /// A pending code may be superseded; a live credential must be revoked
    /// first.
    pub fn issue_code(&self, code: String, scope: String) -> Result<AuthState, AppError> {
        match self {
            AuthState::Unauthenticated | AuthState::CodeIssued { .. } | AuthState::Revoked => {
                Ok(AuthState::CodeIssued { code, scope })
            }
            _ => Err(self.illegal("issue authorization code")),
        }
    }

    /// `CODE_ISSUED → ACTIVE`, only for the code that was issued.
    pub fn activate(&self, code: &str, credential: Credential) -> Result<AuthState, AppError> {
        match self {
            AuthState::CodeIssued { code: issued, .. } if issued == code => {
                Ok(AuthState::Active(credential))
            }
            AuthState::CodeIssued { .. } => Err(AppError::InvalidGrant(
                "authorization code does not match the issued code".to_string(),
            )),
            _ => Err(self.illegal("exchange authorization code")),
        }
    }

    /// `ACTIVE → EXPIRED`.
    pub fn expire(&self) -> Result<AuthState, AppError> {
        match self {
            AuthState::Active(c) => Ok(AuthState::Expired(c.clone())),
            AuthState::Expired(_) => Ok(self.clone()),
            _ => Err(self.illegal("expire")),
        }
    }

    /// `ACTIVE | EXPIRED → ACTIVE` with a rotated credential.
    pub fn rotate(&self, credential: Credential) -> Result<AuthState, AppError> {
        match self {
            AuthState::Active(_) | AuthState::Expired(_) => Ok(AuthState::Active(credential)),
            AuthState::Revoked => Err(AppError::RefreshRevoked(
                "session revoked, re-authorization required".to_string(),
            )),
            _ => Err(self.illegal("refresh")),
        }
    }

    /// Any state → `REVOKED`.
    pub fn revoke(&self) -> AuthState {
        AuthState::Revoked
    }
}
