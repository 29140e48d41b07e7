//! Unit tests for hour orchestration and the minute fallback

use chrono::{DateTime, TimeZone, Utc};
use secrecy::ExposeSecret;
use serde_json::json;
use umbrella_activity_downloader::downloader::executor::IncompleteReason;
use umbrella_activity_downloader::downloader::EngineConfig;
use umbrella_activity_downloader::fetcher::pagination::{AbortReason, SubdivisionReason};
use umbrella_activity_downloader::fetcher::PageResponse;
use umbrella_activity_downloader::window::{TimeWindow, MINUTE_MS};

use crate::support::{initial_token, page, paginator, status, FakeApi, FakeAuthority};

fn hour_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap()
}

/// Minute index (0-59) of a minute window inside the test hour
fn minute_of(window: &TimeWindow) -> i64 {
    (window.start_ms() - hour_start().timestamp_millis()) / MINUTE_MS
}

/// One event per minute, tagged with the minute it came from
fn minute_page(window: &TimeWindow) -> PageResponse {
    let minute = minute_of(window);
    PageResponse::new(200, json!({"data": [{"minute": minute}]}).to_string())
}

fn is_hour(window: &TimeWindow) -> bool {
    window.end_ms() - window.start_ms() + 1 == 60 * MINUTE_MS
}

#[tokio::test(start_paused = true)]
async fn test_small_hour_needs_single_request() {
    let api = FakeApi::scripted(vec![Ok(page(42, 0))]);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (report, _) = paginator.fetch_hour(hour_start(), initial_token()).await;

    assert_eq!(report.events.len(), 42);
    assert!(!report.subdivided);
    assert!(report.is_complete());
    assert_eq!(report.window, TimeWindow::hour(&hour_start()));
    assert_eq!(api.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_hour_falls_back_to_sixty_minutes_in_order() {
    let api = FakeApi::new(|query, _| {
        if is_hour(&query.window) {
            Ok(status(400))
        } else {
            Ok(minute_page(&query.window))
        }
    });
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (report, _) = paginator.fetch_hour(hour_start(), initial_token()).await;

    assert!(report.subdivided);
    assert!(report.is_complete());
    assert_eq!(api.call_count(), 61);

    let calls = api.calls();
    assert!(is_hour(&calls[0].window));
    let minutes: Vec<i64> = calls[1..].iter().map(|c| minute_of(&c.window)).collect();
    assert_eq!(minutes, (0..60).collect::<Vec<i64>>());

    let tagged: Vec<i64> = report
        .events
        .iter()
        .filter_map(|e| e.field("minute").and_then(|v| v.as_i64()))
        .collect();
    assert_eq!(tagged, (0..60).collect::<Vec<i64>>());
}

#[tokio::test(start_paused = true)]
async fn test_ceiling_discards_hour_results_and_minutes_have_no_ceiling() {
    let config = EngineConfig {
        offset_ceiling: Some(2000),
        ..EngineConfig::default()
    };
    let api = FakeApi::new(|query, _| {
        if is_hour(&query.window) {
            return Ok(page(1000, query.offset));
        }
        // Each minute holds 3010 events: beyond the hour ceiling
        if query.offset < 3000 {
            Ok(page(1000, query.offset))
        } else {
            Ok(page(10, query.offset))
        }
    });
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), config);

    let (report, _) = paginator.fetch_hour(hour_start(), initial_token()).await;

    assert!(report.subdivided);
    assert!(report.is_complete());
    assert_eq!(report.events.len(), 60 * 3010);
    // two hour pages, then four pages per minute
    assert_eq!(api.call_count(), 2 + 60 * 4);
}

#[tokio::test(start_paused = true)]
async fn test_failed_minute_is_recorded_and_others_kept() {
    let api = FakeApi::new(|query, _| {
        if is_hour(&query.window) {
            Ok(status(404))
        } else if minute_of(&query.window) == 7 {
            Ok(status(500))
        } else {
            Ok(minute_page(&query.window))
        }
    });
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (report, _) = paginator.fetch_hour(hour_start(), initial_token()).await;

    assert!(report.subdivided);
    assert!(!report.is_complete());
    assert_eq!(report.events.len(), 59);
    assert_eq!(report.incomplete.len(), 1);
    let incomplete = &report.incomplete[0];
    assert_eq!(minute_of(&incomplete.window), 7);
    assert_eq!(
        incomplete.reason,
        IncompleteReason::Aborted(AbortReason::UnexpectedStatus { status: 500 })
    );
}

#[tokio::test(start_paused = true)]
async fn test_minute_still_rejected_is_recorded_not_subdivided() {
    let api = FakeApi::new(|query, _| {
        if is_hour(&query.window) || minute_of(&query.window) == 30 {
            Ok(status(400))
        } else {
            Ok(minute_page(&query.window))
        }
    });
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (report, _) = paginator.fetch_hour(hour_start(), initial_token()).await;

    assert_eq!(api.call_count(), 61);
    assert_eq!(report.events.len(), 59);
    assert_eq!(
        report.incomplete[0].reason,
        IncompleteReason::StillTooLarge(SubdivisionReason::WindowRejected { status: 400 })
    );
}

#[tokio::test(start_paused = true)]
async fn test_aborted_hour_keeps_partial_events() {
    let api = FakeApi::scripted(vec![Ok(page(1000, 0)), Ok(status(502))]);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (report, _) = paginator.fetch_hour(hour_start(), initial_token()).await;

    assert!(!report.subdivided);
    assert_eq!(report.events.len(), 1000);
    assert_eq!(report.incomplete.len(), 1);
    assert_eq!(report.incomplete[0].events_kept, 1000);
    assert_eq!(api.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_token_renewed_in_one_minute_is_used_by_the_next() {
    let api = FakeApi::new(|query, index| {
        if is_hour(&query.window) {
            Ok(status(400))
        } else if minute_of(&query.window) == 3 && index == 4 {
            // first request for minute 3
            Ok(status(403))
        } else {
            Ok(minute_page(&query.window))
        }
    });
    let authority = FakeAuthority::new();
    let mut paginator = paginator(api.clone(), authority.clone(), EngineConfig::default());

    let (report, token) = paginator.fetch_hour(hour_start(), initial_token()).await;

    assert!(report.is_complete());
    assert_eq!(report.events.len(), 60);
    assert_eq!(authority.issued(), 1);
    assert_eq!(token.secret().expose_secret(), "token-1");

    let calls = api.calls();
    assert_eq!(calls.len(), 62);
    assert_eq!(calls[4].token, "token-0");
    assert!(calls[5..].iter().all(|c| c.token == "token-1"));
}
