// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end run: retrieve activities, enrich them with weather, aggregate.
//!
//! Credential failures abort a run. Anything that goes wrong for a single
//! activity is recorded in the report's `degraded` list. The activity is still
//! counted in its week unless its local date falls outside the window.

use chrono::{Duration, NaiveDate, NaiveTime};
use dashmap::DashMap;
use futures_util::{stream, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    Activity, ActivityRecord, DegradationReason, DegradedActivity, EnrichedActivity,
    PipelineReport, WeatherObservation,
};
use crate::services::aggregate::{aggregate, overall, week_window};
use crate::services::credentials::CredentialManager;
use crate::services::resolver::resolve;
use crate::services::strava::{StravaClient, StravaService};
use crate::services::weather::{WeatherCache, WeatherClient, WeatherService};
use crate::time_utils::{Clock, SystemClock};

/// Weather requests in flight at once.
pub const MAX_CONCURRENT_WEATHER_LOOKUPS: usize = 6;

/// Upper bound on the `weeks` argument.
pub const MAX_WEEKS: u32 = 52;

pub struct Pipeline {
    strava: StravaService,
    weather: WeatherService,
    clock: Arc<dyn Clock>,
    /// Activities retrieved in this session, by id.
    activities: DashMap<u64, Activity>,
}

impl Pipeline {
    pub fn new(strava: StravaService, weather: WeatherService, clock: Arc<dyn Clock>) -> Self {
        Self {
            strava,
            weather,
            clock,
            activities: DashMap::new(),
        }
    }

    /// Wire up the production clients.
    pub fn from_config(config: &Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let strava_client = StravaClient::new(config)?;
        let credentials = Arc::new(CredentialManager::from_config(
            config,
            strava_client.clone(),
            clock.clone(),
        ));
        let strava = StravaService::new(strava_client, credentials);
        let weather = WeatherService::new(WeatherClient::new(config)?, Arc::new(WeatherCache::new()));

        Ok(Self::new(strava, weather, clock))
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        self.strava.credentials()
    }

    pub fn weather(&self) -> &WeatherService {
        &self.weather
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    /// Activities from the last `weeks` ISO weeks, oldest first.
    pub async fn recent_activities(&self, weeks: u32) -> Result<Vec<Activity>> {
        let (activities, _) = self.retrieve(validate_weeks(weeks)?, self.today()).await?;
        Ok(activities)
    }

    /// Activities in the window, plus accounting entries for those fetched in
    /// the query margin but dated outside it.
    async fn retrieve(
        &self,
        weeks: u32,
        today: NaiveDate,
    ) -> Result<(Vec<Activity>, Vec<DegradedActivity>)> {
        let (first, end) = week_window(today, weeks);

        // Query a day past each end of the window: buckets use the local
        // date, which may fall on either side of the UTC date.
        let after = (first - Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
        let before = (end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();

        let credential = self.credentials().valid_credential().await?;
        let fetched: Vec<Activity> = self
            .strava
            .list_activities(credential, after, before)
            .try_collect()
            .await?;

        let (mut activities, mut outside): (Vec<_>, Vec<_>) = fetched.into_iter().partition(|a| {
            let date = a.local_date();
            date >= first && date < end
        });
        activities.sort_by_key(|a| (a.start_time, a.id));
        outside.sort_by_key(|a| (a.start_time, a.id));

        for activity in &activities {
            self.activities.insert(activity.id, activity.clone());
        }

        tracing::info!(
            weeks,
            count = activities.len(),
            outside_window = outside.len(),
            from = %first,
            to = %end,
            "Retrieved activities"
        );

        let outside = outside
            .into_iter()
            .map(|a| DegradedActivity {
                activity_id: a.id,
                reason: DegradationReason::OutsideWindow,
            })
            .collect();
        Ok((activities, outside))
    }

    /// Attach weather to each activity.
    ///
    /// Once `cancel` fires no new lookups start; lookups already started run
    /// to completion. Records come back in input order.
    pub async fn enrich(
        &self,
        activities: Vec<Activity>,
        cancel: &CancellationToken,
    ) -> (Vec<ActivityRecord>, Vec<DegradedActivity>) {
        let mut outcomes: HashMap<u64, std::result::Result<WeatherObservation, DegradationReason>> =
            stream::iter(activities.clone())
                .map(|activity| {
                    let cancel = cancel.clone();
                    async move {
                        if cancel.is_cancelled() {
                            return (activity.id, Err(DegradationReason::Cancelled));
                        }
                        let outcome = self.lookup(&activity).await;
                        (activity.id, outcome)
                    }
                })
                .buffer_unordered(MAX_CONCURRENT_WEATHER_LOOKUPS)
                .collect()
                .await;

        let mut records = Vec::with_capacity(activities.len());
        let mut degraded = Vec::new();

        for activity in activities {
            let outcome = outcomes
                .remove(&activity.id)
                .unwrap_or(Err(DegradationReason::Cancelled));

            let reason = match outcome {
                Ok(weather) => match EnrichedActivity::new(activity.clone(), weather) {
                    Ok(enriched) => {
                        records.push(ActivityRecord::Enriched(enriched));
                        continue;
                    }
                    Err(e) => DegradationReason::WeatherUnavailable {
                        message: e.to_string(),
                    },
                },
                Err(reason) => reason,
            };

            degraded.push(DegradedActivity {
                activity_id: activity.id,
                reason,
            });
            records.push(ActivityRecord::Unenriched(activity));
        }

        if !degraded.is_empty() {
            tracing::warn!(
                degraded = degraded.len(),
                total = records.len(),
                "Some activities could not be enriched"
            );
        }

        (records, degraded)
    }

    async fn lookup(
        &self,
        activity: &Activity,
    ) -> std::result::Result<WeatherObservation, DegradationReason> {
        let at = resolve(activity).map_err(|_| DegradationReason::MissingLocation)?;

        self.weather
            .fetch(at.latitude, at.longitude, at.date)
            .await
            .map_err(|e| {
                tracing::warn!(activity_id = activity.id, error = %e, "Weather lookup failed");
                DegradationReason::WeatherUnavailable {
                    message: e.to_string(),
                }
            })
    }

    /// Full run over the last `weeks` weeks.
    pub async fn run(&self, weeks: u32, cancel: &CancellationToken) -> Result<PipelineReport> {
        let weeks = validate_weeks(weeks)?;
        let today = self.today();

        let (activities, outside) = self.retrieve(weeks, today).await?;
        let (records, mut degraded) = self.enrich(activities, cancel).await;
        degraded.extend(outside);
        let summaries = aggregate(&records, weeks, today);

        tracing::info!(
            weeks = summaries.len(),
            degraded = degraded.len(),
            "Weekly summaries computed"
        );
        Ok(PipelineReport {
            overall: overall(&summaries),
            weeks: summaries,
            degraded,
        })
    }

    /// Weather for one activity, fetching the activity if this session has
    /// not seen it yet.
    pub async fn weather_for_activity(&self, activity_id: u64) -> Result<EnrichedActivity> {
        let known = self.activities.get(&activity_id).map(|a| a.value().clone());
        let activity = match known {
            Some(activity) => activity,
            None => {
                let credential = self.credentials().valid_credential().await?;
                let activity = self.strava.get_activity(credential, activity_id).await?;
                self.activities.insert(activity.id, activity.clone());
                activity
            }
        };

        let at = resolve(&activity)?;
        let weather = self.weather.fetch(at.latitude, at.longitude, at.date).await?;
        EnrichedActivity::new(activity, weather)
    }
}

fn validate_weeks(weeks: u32) -> Result<u32> {
    if weeks == 0 || weeks > MAX_WEEKS {
        return Err(AppError::BadRequest(format!(
            "weeks must be between 1 and {}",
            MAX_WEEKS
        )));
    }
    Ok(weeks)
}
