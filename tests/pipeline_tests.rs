// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end pipeline runs against mock Strava and weather servers.

use activity_weather::error::AppError;
use activity_weather::models::{DegradationReason, DegradedActivity};
use chrono::NaiveDate;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

const CHICAGO: [f64; 2] = [41.8781, -87.6298];
/// Same 0.01° cell as `CHICAGO`.
const CHICAGO_NEARBY: [f64; 2] = [41.8802, -87.6340];

async fn mount_activities(strava: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(strava)
        .await;
}

fn scenario_activities() -> serde_json::Value {
    json!([
        common::activity_json(3, "2024-03-08T07:00:00", 3000.0, None),
        common::activity_json(2, "2024-03-01T17:30:00", 5000.0, Some(CHICAGO_NEARBY)),
        common::activity_json(1, "2024-03-01T07:15:00", 10000.0, Some(CHICAGO)),
    ])
}

#[tokio::test]
async fn test_two_week_scenario() {
    let strava = MockServer::start().await;
    let weather = MockServer::start().await;
    common::mount_code_exchange(&strava, 1).await;
    mount_activities(&strava, scenario_activities()).await;

    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::weather_json("2024-03-01", 61, 4.0)),
        )
        .expect(1)
        .mount(&weather)
        .await;

    let pipeline = common::pipeline(&common::test_config(&strava, &weather), common::test_clock());
    let report = pipeline.run(2, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.weeks.len(), 2);

    let first = &report.weeks[0];
    assert_eq!(first.week_start, NaiveDate::from_ymd_opt(2024, 2, 26).unwrap());
    assert_eq!(first.activity_count, 2);
    assert_eq!(first.enriched_count, 2);
    assert_eq!(first.total_distance_meters, 15000.0);
    assert_eq!(first.dominant_weather_condition.as_deref(), Some("rain"));
    assert_eq!(first.mean_temperature, Some(4.0));

    let second = &report.weeks[1];
    assert_eq!(second.week_start, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    assert_eq!(second.activity_count, 1);
    assert_eq!(second.enriched_count, 0);
    assert_eq!(second.total_distance_meters, 3000.0);
    assert_eq!(second.dominant_weather_condition, None);

    assert_eq!(
        report.degraded,
        vec![DegradedActivity {
            activity_id: 3,
            reason: DegradationReason::MissingLocation,
        }]
    );
}

#[tokio::test]
async fn test_repeated_runs_are_byte_identical() {
    let strava = MockServer::start().await;
    let weather = MockServer::start().await;
    common::mount_code_exchange(&strava, 1).await;
    mount_activities(&strava, scenario_activities()).await;

    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::weather_json("2024-03-01", 2, 6.5)),
        )
        .expect(1)
        .mount(&weather)
        .await;

    let pipeline = common::pipeline(&common::test_config(&strava, &weather), common::test_clock());
    let first = pipeline.run(3, &CancellationToken::new()).await.unwrap();
    let second = pipeline.run(3, &CancellationToken::new()).await.unwrap();

    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[tokio::test]
async fn test_weather_outage_degrades_without_aborting() {
    let strava = MockServer::start().await;
    let weather = MockServer::start().await;
    common::mount_code_exchange(&strava, 1).await;
    mount_activities(
        &strava,
        json!([common::activity_json(1, "2024-03-05T07:15:00", 8000.0, Some(CHICAGO))]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&weather)
        .await;

    let pipeline = common::pipeline(&common::test_config(&strava, &weather), common::test_clock());
    let report = pipeline.run(1, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.weeks.len(), 1);
    assert_eq!(report.weeks[0].activity_count, 1);
    assert_eq!(report.weeks[0].total_distance_meters, 8000.0);
    assert_eq!(report.weeks[0].enriched_count, 0);

    assert_eq!(report.degraded.len(), 1);
    assert_eq!(report.degraded[0].activity_id, 1);
    assert!(matches!(
        report.degraded[0].reason,
        DegradationReason::WeatherUnavailable { .. }
    ));
}

#[tokio::test]
async fn test_cancelled_run_starts_no_lookups() {
    let strava = MockServer::start().await;
    let weather = MockServer::start().await;
    common::mount_code_exchange(&strava, 1).await;
    mount_activities(&strava, scenario_activities()).await;

    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&weather)
        .await;

    let pipeline = common::pipeline(&common::test_config(&strava, &weather), common::test_clock());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = pipeline.run(2, &cancel).await.unwrap();
    assert_eq!(report.weeks[0].activity_count, 2);
    assert_eq!(report.degraded.len(), 3);
    assert!(report
        .degraded
        .iter()
        .all(|d| d.reason == DegradationReason::Cancelled));
}

#[tokio::test]
async fn test_margin_activity_is_accounted_not_counted() {
    let strava = MockServer::start().await;
    let weather = MockServer::start().await;
    common::mount_code_exchange(&strava, 1).await;
    // Sunday before the first week of the window; inside the query margin.
    mount_activities(
        &strava,
        json!([
            common::activity_json(7, "2024-02-25T08:00:00", 6000.0, Some(CHICAGO)),
            common::activity_json(8, "2024-03-05T08:00:00", 4000.0, None),
        ]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&weather)
        .await;

    let pipeline = common::pipeline(&common::test_config(&strava, &weather), common::test_clock());
    let report = pipeline.run(2, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.overall.activity_count, 1);
    assert_eq!(report.weeks.iter().map(|w| w.activity_count).sum::<u32>(), 1);
    assert_eq!(
        report.degraded,
        vec![
            DegradedActivity {
                activity_id: 8,
                reason: DegradationReason::MissingLocation,
            },
            DegradedActivity {
                activity_id: 7,
                reason: DegradationReason::OutsideWindow,
            },
        ]
    );

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["degraded"][1]["reason"]["kind"], "outside_window");
}

#[tokio::test]
async fn test_refresh_during_weather_lookups() {
    let strava = MockServer::start().await;
    let weather = MockServer::start().await;
    common::mount_code_exchange(&strava, 1).await;
    common::mount_refresh(
        &strava,
        "refresh-1",
        "access-2",
        "refresh-2",
        common::test_now() + chrono::Duration::hours(12),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            common::activity_json(1, "2024-03-05T07:00:00", 8000.0, Some(CHICAGO)),
            common::activity_json(2, "2024-03-06T07:00:00", 6000.0, Some(CHICAGO)),
        ])))
        .expect(1)
        .mount(&strava)
        .await;

    for (day, code) in [("2024-03-05", 0u8), ("2024-03-06", 61)] {
        Mock::given(method("GET"))
            .and(path("/v1/archive"))
            .and(query_param("start_date", day))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(common::weather_json(day, code, 5.0))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&weather)
            .await;
    }

    let pipeline = common::pipeline(&common::test_config(&strava, &weather), common::test_clock());
    let credentials = pipeline.credentials().clone();
    let original = credentials.valid_credential().await.unwrap();

    let cancel = CancellationToken::new();
    let (report, rotated) = tokio::join!(pipeline.run(1, &cancel), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        credentials.refresh(&original).await
    });

    let report = report.unwrap();
    let rotated = rotated.unwrap();
    assert_eq!(rotated.access_token, "access-2");
    assert!(report.degraded.is_empty());
    assert_eq!(report.weeks[0].enriched_count, 2);
    assert_eq!(credentials.valid_credential().await.unwrap(), rotated);
}

#[tokio::test]
async fn test_credential_failure_aborts_run() {
    let strava = MockServer::start().await;
    let weather = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Authorization Error"))
        .mount(&strava)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&strava)
        .await;

    let pipeline = common::pipeline(&common::test_config(&strava, &weather), common::test_clock());
    let err = pipeline.run(2, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidGrant(_)));
    assert!(err.is_credential_error());
}

#[tokio::test]
async fn test_weeks_out_of_range() {
    let strava = MockServer::start().await;
    let weather = MockServer::start().await;
    let pipeline = common::pipeline(&common::test_config(&strava, &weather), common::test_clock());

    let err = pipeline.run(0, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    let err = pipeline.recent_activities(53).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_weather_for_known_activity_uses_session_index() {
    let strava = MockServer::start().await;
    let weather = MockServer::start().await;
    common::mount_code_exchange(&strava, 1).await;
    mount_activities(&strava, scenario_activities()).await;
    Mock::given(method("GET"))
        .and(path("/api/v3/activities/1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&strava)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::weather_json("2024-03-01", 0, 9.0)),
        )
        .expect(1)
        .mount(&weather)
        .await;

    let pipeline = common::pipeline(&common::test_config(&strava, &weather), common::test_clock());
    let activities = pipeline.recent_activities(2).await.unwrap();
    let ids: Vec<u64> = activities.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let enriched = pipeline.weather_for_activity(1).await.unwrap();
    assert_eq!(enriched.activity().id, 1);
    assert_eq!(enriched.weather().date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    assert_eq!(enriched.weather().condition_code, "clear");

    let err = pipeline.weather_for_activity(3).await.unwrap_err();
    assert!(matches!(err, AppError::MissingLocation(3)));
}

#[tokio::test]
async fn test_weather_for_unseen_activity_fetches_it() {
    let strava = MockServer::start().await;
    let weather = MockServer::start().await;
    common::mount_code_exchange(&strava, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/v3/activities/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::activity_json(
            42,
            "2024-03-01T07:15:00",
            10000.0,
            Some(CHICAGO),
        )))
        .expect(1)
        .mount(&strava)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::weather_json("2024-03-01", 45, 1.0)),
        )
        .expect(1)
        .mount(&weather)
        .await;

    let pipeline = common::pipeline(&common::test_config(&strava, &weather), common::test_clock());

    let enriched = pipeline.weather_for_activity(42).await.unwrap();
    assert_eq!(enriched.weather().condition_code, "fog");

    // Second call hits both the activity index and the weather cache.
    let again = pipeline.weather_for_activity(42).await.unwrap();
    assert_eq!(again, enriched);
}
