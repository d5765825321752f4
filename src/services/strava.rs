// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client for OAuth and activity retrieval.
//!
//! Handles:
//! - Authorization URL construction and token grants
//! - Paginated activity listing, deduplicated across pages
//! - Rate limit backoff (429) and timeout retries
//! - One credential refresh on 401 before giving up

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Activity, Credential};
use crate::services::credentials::CredentialManager;
use crate::services::retry::RetryConfig;
use chrono::{DateTime, Utc};
use futures_util::{stream, Stream, TryStreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Activities requested per page.
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Hard stop for pagination in case the provider never returns a short page.
const MAX_PAGES: u32 = 200;

/// OAuth application credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    api_url: String,
    oauth_url: String,
    retry: RetryConfig,
}

impl StravaClient {
    /// Create a client with the configured endpoints and request timeout.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_url: config.strava_api_url.trim_end_matches('/').to_string(),
            oauth_url: config.strava_oauth_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::strava(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// URL the user visits to grant access.
    pub fn authorization_url(&self, client_id: &str, redirect_uri: &str, scope: &str) -> String {
        format!(
            "{}/authorize?\
             client_id={}&\
             response_type=code&\
             redirect_uri={}&\
             approval_prompt=force&\
             scope={}",
            self.oauth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(scope)
        )
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        app: &ClientCredentials,
        code: &str,
    ) -> Result<TokenResponse> {
        self.token_request(&[
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(
        &self,
        app: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        self.token_request(&[
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    /// POST to the token endpoint. A 400/401 answer means the grant itself
    /// was rejected.
    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let url = format!("{}/token", self.oauth_url);
        let response = self
            .send_with_retry(|| self.http.post(&url).form(form))
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Strava token endpoint rejected grant");
            return Err(AppError::InvalidGrant(format!("HTTP {}: {}", status, body)));
        }

        self.check_response_json(response).await
    }

    /// Fetch one page of the athlete's activities.
    pub async fn list_activities_page(
        &self,
        access_token: &str,
        after: i64, // Unix timestamp
        before: i64,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/athlete/activities", self.api_url);
        let query = [
            ("after", after.to_string()),
            ("before", before.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];

        let response = self
            .send_with_retry(|| self.http.get(&url).bearer_auth(access_token).query(&query))
            .await?;

        self.check_response_json(response).await
    }

    /// Get a single activity by ID.
    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/activities/{}", self.api_url, activity_id);
        let response = self
            .send_with_retry(|| self.http.get(&url).bearer_auth(access_token))
            .await?;

        self.check_response_json(response).await
    }

    /// Send a request, backing off on 429 and timeouts.
    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let exhausted = attempt >= self.retry.max_attempts;

            match build().send().await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if exhausted {
                        tracing::warn!(attempts = attempt, "Strava rate limit exceeded, giving up");
                        return Err(AppError::RateLimitExceeded { attempts: attempt });
                    }
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        backoff_ms = delay.as_millis() as u64,
                        "Strava rate limit hit (429), backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() => {
                    if exhausted {
                        return Err(AppError::NetworkTimeout(format!(
                            "Strava request timed out after {} attempts",
                            attempt
                        )));
                    }
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(attempt, error = %e, "Strava request timed out, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(AppError::StravaApi(e.to_string())),
            }
        }
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status == StatusCode::UNAUTHORIZED {
                return Err(AppError::StravaApi(
                    AppError::STRAVA_TOKEN_ERROR.to_string(),
                ));
            }

            if status == StatusCode::NOT_FOUND {
                return Err(AppError::NotFound(format!("Strava resource: {}", body)));
            }

            return Err(AppError::StravaApi(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::StravaApi(format!("JSON parse error: {}", e)))
    }
}

/// Token grant response from Strava.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// StravaService - Activity retrieval with credential handling
// ─────────────────────────────────────────────────────────────────────────────

/// Pagination state carried between pages.
struct PageCursor {
    credential: Credential,
    page: u32,
    seen: HashSet<u64>,
    done: bool,
}

/// High-level Strava service: activity retrieval on top of a credential.
///
/// A 401 from Strava triggers exactly one refresh through the
/// `CredentialManager`; a second 401 with the refreshed credential is fatal.
#[derive(Clone)]
pub struct StravaService {
    client: StravaClient,
    credentials: Arc<CredentialManager>,
    per_page: u32,
}

impl StravaService {
    pub fn new(client: StravaClient, credentials: Arc<CredentialManager>) -> Self {
        Self {
            client,
            credentials,
            per_page: DEFAULT_PER_PAGE,
        }
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    /// Activities starting in `[after, before)`, newest pages fetched lazily.
    ///
    /// The stream is finite and not restartable: polling a new stream issues
    /// new requests. Activity IDs are unique within one stream. Later pages
    /// use the refreshed credential if a refresh happened along the way.
    pub fn list_activities(
        &self,
        credential: Credential,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> impl Stream<Item = Result<Activity>> + '_ {
        let cursor = PageCursor {
            credential,
            page: 1,
            seen: HashSet::new(),
            done: false,
        };

        stream::try_unfold(cursor, move |cursor| self.next_page(cursor, after, before))
            .map_ok(|batch| stream::iter(batch.into_iter().map(Ok::<Activity, AppError>)))
            .try_flatten()
    }

    async fn next_page(
        &self,
        mut cursor: PageCursor,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Option<(Vec<Activity>, PageCursor)>> {
        if cursor.done {
            return Ok(None);
        }
        if cursor.page > MAX_PAGES {
            tracing::warn!(max_pages = MAX_PAGES, "Stopping activity pagination at page cap");
            return Ok(None);
        }

        let page = cursor.page;
        let per_page = self.per_page;
        let client = &self.client;
        let payloads = self
            .call_authorized(&mut cursor.credential, move |token| async move {
                client
                    .list_activities_page(
                        &token,
                        after.timestamp(),
                        before.timestamp(),
                        page,
                        per_page,
                    )
                    .await
            })
            .await?;

        if payloads.is_empty() {
            tracing::debug!(page, "Empty activity page, pagination complete");
            return Ok(None);
        }

        let fetched = payloads.len();
        let mut fresh = Vec::with_capacity(fetched);
        let mut any_in_window = false;

        for payload in payloads {
            let activity = Activity::from_payload(payload)?;
            if activity.start_time < after {
                continue;
            }
            any_in_window = true;
            if activity.start_time >= before {
                continue;
            }
            if cursor.seen.insert(activity.id) {
                fresh.push(activity);
            } else {
                tracing::debug!(activity_id = activity.id, page, "Skipping duplicate activity");
            }
        }

        if !any_in_window {
            tracing::debug!(page, "Activity page older than window, pagination complete");
            return Ok(None);
        }

        tracing::debug!(page, fetched, new = fresh.len(), "Fetched activity page");
        cursor.done = fetched < per_page as usize;
        cursor.page += 1;
        Ok(Some((fresh, cursor)))
    }

    /// Get a single activity by ID.
    pub async fn get_activity(
        &self,
        mut credential: Credential,
        activity_id: u64,
    ) -> Result<Activity> {
        let client = &self.client;
        let payload = self
            .call_authorized(&mut credential, move |token| async move {
                client.get_activity(&token, activity_id).await
            })
            .await?;

        Activity::from_payload(payload)
    }

    /// Run `op` with the credential's access token, refreshing once on 401.
    async fn call_authorized<T, F, Fut>(&self, credential: &mut Credential, op: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match op(credential.access_token.clone()).await {
            Err(e) if e.is_strava_token_error() => {
                tracing::info!("Strava rejected access token, refreshing once");
                *credential = self.credentials.force_refresh(credential).await?;

                match op(credential.access_token.clone()).await {
                    Err(e) if e.is_strava_token_error() => {
                        tracing::error!("Strava rejected the refreshed access token");
                        Err(AppError::Unauthorized)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }
}
