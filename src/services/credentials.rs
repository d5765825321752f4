// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential lifecycle manager for the Strava OAuth session.
//!
//! The manager owns the single live credential. All transitions run under one
//! async mutex, which also serializes refreshes: two callers that both see an
//! expired token share a single refresh call, and nobody ever observes a
//! half-rotated credential. Callers receive clones, so a credential handed
//! out before a rotation stays intact for the request that is using it.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{AuthState, Credential};
use crate::services::strava::{ClientCredentials, StravaClient, TokenResponse};
use crate::time_utils::{format_utc_rfc3339, Clock};

/// Supplies the authorization code for a given authorization URL.
///
/// Strava only issues codes through a browser redirect, which is outside this
/// crate. Production pulls an operator-supplied code; tests plug in fakes.
pub trait AuthorizationCodeSource: Send + Sync {
    fn obtain_code(&self, authorize_url: &str) -> Result<String>;
}

/// Code pasted by the operator after visiting the authorization URL.
#[derive(Debug, Clone, Default)]
pub struct OutOfBandCode {
    code: Option<String>,
}

impl OutOfBandCode {
    pub fn new(code: Option<String>) -> Self {
        Self { code }
    }
}

impl AuthorizationCodeSource for OutOfBandCode {
    fn obtain_code(&self, authorize_url: &str) -> Result<String> {
        match &self.code {
            Some(code) => Ok(code.clone()),
            None => {
                tracing::warn!(
                    url = %authorize_url,
                    "No authorization code configured; visit the URL and set STRAVA_AUTH_CODE"
                );
                Err(AppError::AuthRequest(format!(
                    "no authorization code available, authorize at {}",
                    authorize_url
                )))
            }
        }
    }
}

/// State guarded by the manager's mutex.
struct Session {
    app: ClientCredentials,
    state: AuthState,
    /// Codes already presented to the token endpoint.
    used_codes: HashSet<String>,
    /// Refresh tokens the provider has rotated away from.
    retired_refresh_tokens: HashSet<String>,
}

/// Owns the OAuth session state machine.
pub struct CredentialManager {
    client: StravaClient,
    code_source: Arc<dyn AuthorizationCodeSource>,
    clock: Arc<dyn Clock>,
    redirect_uri: String,
    default_scope: String,
    session: Mutex<Session>,
}

impl CredentialManager {
    pub fn new(
        client: StravaClient,
        app: ClientCredentials,
        code_source: Arc<dyn AuthorizationCodeSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            code_source,
            clock,
            redirect_uri: crate::config::DEFAULT_REDIRECT_URI.to_string(),
            default_scope: crate::config::DEFAULT_SCOPE.to_string(),
            session: Mutex::new(Session {
                app,
                state: AuthState::Unauthenticated,
                used_codes: HashSet::new(),
                retired_refresh_tokens: HashSet::new(),
            }),
        }
    }

    /// Build from configuration, resuming from a refresh token when one is
    /// configured.
    pub fn from_config(
        config: &Config,
        client: StravaClient,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let app = ClientCredentials {
            client_id: config.strava_client_id.clone(),
            client_secret: config.strava_client_secret.clone(),
        };
        let code_source = Arc::new(OutOfBandCode::new(config.strava_auth_code.clone()));

        let mut manager = Self::new(client, app, code_source, clock);
        manager.redirect_uri = config.strava_redirect_uri.clone();
        manager.default_scope = config.strava_scope.clone();

        if let Some(refresh_token) = &config.strava_refresh_token {
            tracing::info!("Resuming Strava session from configured refresh token");
            manager.session.get_mut().state = AuthState::Expired(Credential::from_refresh_token(
                refresh_token.clone(),
                config.strava_scope.clone(),
            ));
        }

        manager
    }

    /// Name of the current state, for diagnostics.
    pub async fn state_name(&self) -> &'static str {
        self.session.lock().await.state.name()
    }

    /// Like `state_name` but never waits; `None` while a transition or a
    /// token exchange holds the session.
    pub fn try_state_name(&self) -> Option<&'static str> {
        self.session.try_lock().ok().map(|session| session.state.name())
    }

    /// Expired, or within the safety margin of expiring.
    pub fn is_expired(&self, credential: &Credential) -> bool {
        is_expired(credential, self.clock.as_ref())
    }

    /// Start a delegated-authorization cycle and move to `CODE_ISSUED`.
    pub async fn request_authorization_code(
        &self,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<String> {
        let mut session = self.session.lock().await;
        self.request_code_locked(&mut session, client_id, client_secret, scope)
    }

    fn request_code_locked(
        &self,
        session: &mut Session,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<String> {
        let missing: Vec<&str> = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", scope),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
        if !missing.is_empty() {
            return Err(AppError::AuthRequest(format!(
                "missing OAuth settings: {}",
                missing.join(", ")
            )));
        }

        let url = self
            .client
            .authorization_url(client_id, &self.redirect_uri, scope);
        let code = self.code_source.obtain_code(&url)?;

        session.state = session.state.issue_code(code.clone(), scope.to_string())?;
        session.app = ClientCredentials {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        };

        tracing::info!(client_id, scope, "Authorization code issued");
        Ok(code)
    }

    /// Exchange the issued code for a credential and move to `ACTIVE`.
    ///
    /// Each code is accepted at most once, whether or not the exchange
    /// succeeded.
    pub async fn exchange_code_for_token(&self, code: &str) -> Result<Credential> {
        let mut session = self.session.lock().await;
        self.exchange_locked(&mut session, code).await
    }

    async fn exchange_locked(&self, session: &mut Session, code: &str) -> Result<Credential> {
        if session.used_codes.contains(code) {
            tracing::warn!("Authorization code presented twice");
            return Err(AppError::InvalidGrant(
                "authorization code already used".to_string(),
            ));
        }

        let scope = match &session.state {
            AuthState::CodeIssued { code: issued, scope } if issued == code => scope.clone(),
            AuthState::CodeIssued { .. } => {
                return Err(AppError::InvalidGrant(
                    "authorization code does not match the issued code".to_string(),
                ))
            }
            other => {
                return Err(AppError::IllegalTransition {
                    operation: "exchange authorization code",
                    state: other.name(),
                })
            }
        };

        session.used_codes.insert(code.to_string());
        let response = self.client.exchange_code(&session.app, code).await?;
        let credential = credential_from_response(response, &scope)?;

        session.state = session.state.activate(code, credential.clone())?;
        tracing::info!(
            expires_at = %format_utc_rfc3339(credential.expires_at),
            "Strava credential active"
        );
        Ok(credential)
    }

    /// Rotate `credential` through the refresh grant.
    ///
    /// Only the live credential can be refreshed. Once rotated, the presented
    /// credential and any refresh token the provider replaced fail with
    /// `RefreshRevoked` without a network call. A provider rejection revokes
    /// the session.
    pub async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let mut session = self.session.lock().await;
        self.refresh_locked(&mut session, credential).await
    }

    async fn refresh_locked(
        &self,
        session: &mut Session,
        credential: &Credential,
    ) -> Result<Credential> {
        if session
            .retired_refresh_tokens
            .contains(&credential.refresh_token)
        {
            tracing::warn!("Refresh token reused after rotation");
            return Err(AppError::RefreshRevoked(
                "refresh token already rotated".to_string(),
            ));
        }

        match &session.state {
            AuthState::Active(current) | AuthState::Expired(current) => {
                // Strava may hand the same refresh token back, so a rotated
                // credential is recognized by the whole value.
                if current != credential {
                    tracing::warn!("Refresh attempted with a superseded credential");
                    return Err(AppError::RefreshRevoked(
                        "credential already rotated".to_string(),
                    ));
                }
            }
            AuthState::Revoked => {
                return Err(AppError::RefreshRevoked(
                    "session revoked, re-authorization required".to_string(),
                ))
            }
            other => {
                return Err(AppError::IllegalTransition {
                    operation: "refresh",
                    state: other.name(),
                })
            }
        }

        let response = match self
            .client
            .refresh_token(&session.app, &credential.refresh_token)
            .await
        {
            Ok(response) => response,
            Err(AppError::InvalidGrant(msg)) => {
                tracing::error!(reason = %msg, "Strava rejected refresh token, session revoked");
                session
                    .retired_refresh_tokens
                    .insert(credential.refresh_token.clone());
                session.state = session.state.revoke();
                return Err(AppError::RefreshRevoked(msg));
            }
            Err(e) => return Err(e),
        };

        // Strava hands back the same refresh token until it actually rotates.
        if response.refresh_token != credential.refresh_token {
            session
                .retired_refresh_tokens
                .insert(credential.refresh_token.clone());
        }

        let rotated = credential_from_response(response, &credential.scope)?;
        session.state = session.state.rotate(rotated.clone())?;

        tracing::info!(
            expires_at = %format_utc_rfc3339(rotated.expires_at),
            "Strava credential refreshed"
        );
        Ok(rotated)
    }

    /// The live credential, refreshed first if it is expired.
    ///
    /// From `UNAUTHENTICATED` this runs the full authorization cycle with the
    /// configured application credentials.
    pub async fn valid_credential(&self) -> Result<Credential> {
        let mut session = self.session.lock().await;

        if matches!(session.state, AuthState::Unauthenticated) {
            let app = session.app.clone();
            let scope = self.default_scope.clone();
            let code =
                self.request_code_locked(&mut session, &app.client_id, &app.client_secret, &scope)?;
            return self.exchange_locked(&mut session, &code).await;
        }

        let current = match &session.state {
            AuthState::Active(c) if !self.is_expired(c) => return Ok(c.clone()),
            AuthState::Active(c) | AuthState::Expired(c) => c.clone(),
            AuthState::Revoked => {
                return Err(AppError::RefreshRevoked(
                    "session revoked, re-authorization required".to_string(),
                ))
            }
            other => {
                return Err(AppError::IllegalTransition {
                    operation: "use credential",
                    state: other.name(),
                })
            }
        };

        session.state = session.state.expire()?;
        tracing::info!("Access token expired, refreshing");
        self.refresh_locked(&mut session, &current).await
    }

    /// Refresh after the provider rejected `stale`.
    ///
    /// If another caller already rotated past `stale`, the current credential
    /// is returned without a second refresh.
    pub async fn force_refresh(&self, stale: &Credential) -> Result<Credential> {
        let mut session = self.session.lock().await;

        let current = match &session.state {
            AuthState::Active(c) | AuthState::Expired(c) => c.clone(),
            AuthState::Revoked => {
                return Err(AppError::RefreshRevoked(
                    "session revoked, re-authorization required".to_string(),
                ))
            }
            other => {
                return Err(AppError::IllegalTransition {
                    operation: "refresh",
                    state: other.name(),
                })
            }
        };

        if current.access_token != stale.access_token && !self.is_expired(&current) {
            tracing::debug!("Credential already rotated by another caller");
            return Ok(current);
        }

        self.refresh_locked(&mut session, &current).await
    }

    /// End the session. A new authorization cycle is required afterwards.
    pub async fn revoke(&self) {
        let mut session = self.session.lock().await;
        if let Some(credential) = session.state.credential() {
            let token = credential.refresh_token.clone();
            session.retired_refresh_tokens.insert(token);
        }
        session.state = session.state.revoke();
        tracing::info!("Strava session revoked");
    }
}

/// Compare a credential's expiry against the clock, with the safety margin.
pub fn is_expired(credential: &Credential, clock: &dyn Clock) -> bool {
    credential.is_expired_at(clock.now())
}

fn credential_from_response(response: TokenResponse, scope: &str) -> Result<Credential> {
    let expires_at: DateTime<Utc> = DateTime::from_timestamp(response.expires_at, 0)
        .ok_or_else(|| {
            AppError::StravaApi(format!("Invalid token expiry: {}", response.expires_at))
        })?;

    Ok(Credential {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        expires_at,
        scope: response.scope.unwrap_or_else(|| scope.to_string()),
    })
}
