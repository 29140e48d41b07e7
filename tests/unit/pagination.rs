//! Unit tests for the window paginator

use chrono::{TimeZone, Utc};
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio::time::Instant;
use umbrella_activity_downloader::downloader::EngineConfig;
use umbrella_activity_downloader::fetcher::pagination::{
    AbortReason, SubdivisionReason, WindowStatus,
};
use umbrella_activity_downloader::fetcher::{PageResponse, RetryErrorType, TransportError};
use umbrella_activity_downloader::shutdown::ShutdownCoordinator;
use umbrella_activity_downloader::window::TimeWindow;

use crate::support::{
    ids, initial_token, page, paginator, status, timeout, FakeApi, FakeAuthority,
};

fn hour_window() -> TimeWindow {
    TimeWindow::hour(&Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
}

#[tokio::test(start_paused = true)]
async fn test_pages_until_short_page() {
    let api = FakeApi::scripted(vec![
        Ok(page(1000, 0)),
        Ok(page(1000, 1000)),
        Ok(page(250, 2000)),
    ]);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (outcome, _token) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(outcome.status, WindowStatus::Exhausted);
    assert!(outcome.is_complete());
    assert_eq!(outcome.events.len(), 2250);
    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.offset, 2250);
    assert_eq!(api.offsets(), vec![0, 1000, 2000]);
    assert_eq!(ids(&outcome.events), (0..2250).collect::<Vec<u64>>());
    assert!(api.calls().iter().all(|c| c.limit == 1000 && c.window == hour_window()));
}

#[tokio::test(start_paused = true)]
async fn test_exact_multiple_stops_on_empty_page() {
    let api = FakeApi::scripted(vec![Ok(page(1000, 0)), Ok(page(1000, 1000))]);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(outcome.status, WindowStatus::Exhausted);
    assert_eq!(outcome.events.len(), 2000);
    assert_eq!(api.offsets(), vec![0, 1000, 2000]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_window() {
    let api = FakeApi::scripted(vec![Ok(page(0, 0))]);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(outcome.status, WindowStatus::Exhausted);
    assert!(outcome.events.is_empty());
    assert_eq!(outcome.pages, 0);
    assert_eq!(api.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_offset_ceiling_requests_subdivision_without_extra_call() {
    let api = FakeApi::new(|query, _| Ok(page(1000, query.offset)));
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(
        outcome.status,
        WindowStatus::NeedsSubdivision(SubdivisionReason::OffsetCeiling { ceiling: 10_000 })
    );
    assert!(outcome.needs_subdivision());
    assert_eq!(outcome.events.len(), 10_000);
    assert_eq!(outcome.offset, 10_000);
    assert_eq!(api.call_count(), 10);
    assert_eq!(*api.offsets().last().unwrap(), 9000);
}

#[tokio::test(start_paused = true)]
async fn test_no_ceiling_pages_past_ten_thousand() {
    let api = FakeApi::new(|query, _| {
        if query.offset < 12_000 {
            Ok(page(1000, query.offset))
        } else {
            Ok(page(3, query.offset))
        }
    });
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (outcome, _) = paginator
        .fetch_window(hour_window(), None, initial_token())
        .await;

    assert_eq!(outcome.status, WindowStatus::Exhausted);
    assert_eq!(outcome.events.len(), 12_003);
    assert_eq!(api.call_count(), 13);
}

#[tokio::test(start_paused = true)]
async fn test_token_renewed_after_each_403() {
    let api = FakeApi::scripted(vec![
        Ok(status(403)),
        Ok(status(403)),
        Ok(status(403)),
        Ok(page(5, 0)),
    ]);
    let authority = FakeAuthority::new();
    let mut paginator = paginator(api.clone(), authority.clone(), EngineConfig::default());

    let (outcome, token) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(outcome.status, WindowStatus::Exhausted);
    assert_eq!(outcome.events.len(), 5);
    assert_eq!(authority.issued(), 3);
    assert_eq!(token.secret().expose_secret(), "token-3");

    let tokens: Vec<String> = api.calls().into_iter().map(|c| c.token).collect();
    assert_eq!(tokens, vec!["token-0", "token-1", "token-2", "token-3"]);
    assert_eq!(api.offsets(), vec![0, 0, 0, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_five_consecutive_403_abandon_window() {
    let api = FakeApi::new(|_, _| Ok(status(403)));
    let authority = FakeAuthority::new();
    let mut paginator = paginator(api.clone(), authority.clone(), EngineConfig::default());

    let (outcome, token) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(
        outcome.status,
        WindowStatus::Aborted(AbortReason::AuthRejected { consecutive: 5 })
    );
    assert_eq!(api.call_count(), 5);
    assert_eq!(authority.issued(), 5);
    assert_eq!(token.secret().expose_secret(), "token-5");
}

#[tokio::test(start_paused = true)]
async fn test_403_counter_resets_after_success() {
    let mut script = vec![Ok(status(403)); 4];
    script.push(Ok(page(1000, 0)));
    script.extend(vec![Ok(status(403)); 4]);
    script.push(Ok(page(10, 1000)));
    let api = FakeApi::scripted(script);
    let authority = FakeAuthority::new();
    let mut paginator = paginator(api.clone(), authority.clone(), EngineConfig::default());

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(outcome.status, WindowStatus::Exhausted);
    assert_eq!(outcome.events.len(), 1010);
    assert_eq!(authority.issued(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_failed_renewal_pauses_and_keeps_old_token() {
    let api = FakeApi::scripted(vec![Ok(status(403)), Ok(status(403)), Ok(page(1, 0))]);
    let authority = FakeAuthority::failing_first(2);
    let mut paginator = paginator(api.clone(), authority.clone(), EngineConfig::default());
    let start = Instant::now();

    let (outcome, token) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(outcome.status, WindowStatus::Exhausted);
    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert_eq!(authority.attempts(), 2);
    assert_eq!(token.secret().expose_secret(), "token-0");
}

#[tokio::test(start_paused = true)]
async fn test_429_pauses_and_repeats_same_offset() {
    let api = FakeApi::scripted(vec![
        Ok(page(1000, 0)),
        Ok(status(429)),
        Ok(status(429)),
        Ok(page(3, 1000)),
    ]);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());
    let start = Instant::now();

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(outcome.status, WindowStatus::Exhausted);
    assert_eq!(outcome.events.len(), 1003);
    assert_eq!(api.offsets(), vec![0, 1000, 1000, 1000]);
    assert_eq!(start.elapsed(), Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn test_429_cap_abandons_window() {
    let api = FakeApi::new(|_, _| Ok(status(429)));
    let mut config = EngineConfig::default();
    config.retry.max_quota_retries = Some(2);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), config);

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(
        outcome.status,
        WindowStatus::Aborted(AbortReason::QuotaRetriesExhausted { attempts: 3 })
    );
    assert_eq!(api.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_400_requests_subdivision() {
    let api = FakeApi::scripted(vec![Ok(status(400))]);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(
        outcome.status,
        WindowStatus::NeedsSubdivision(SubdivisionReason::WindowRejected { status: 400 })
    );
    assert!(outcome.events.is_empty());
    assert_eq!(api.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_404_mid_window_keeps_collected_events() {
    let api = FakeApi::scripted(vec![Ok(page(1000, 0)), Ok(status(404))]);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(
        outcome.status,
        WindowStatus::NeedsSubdivision(SubdivisionReason::WindowRejected { status: 404 })
    );
    assert_eq!(outcome.events.len(), 1000);
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_status_returns_partial_results() {
    let api = FakeApi::scripted(vec![Ok(page(1000, 0)), Ok(status(500))]);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(
        outcome.status,
        WindowStatus::Aborted(AbortReason::UnexpectedStatus { status: 500 })
    );
    assert_eq!(outcome.events.len(), 1000);
    assert_eq!(api.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_body_returns_partial_results() {
    let api = FakeApi::scripted(vec![
        Ok(page(1000, 0)),
        Ok(PageResponse::new(200, "<html>gateway</html>")),
    ]);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert!(matches!(
        outcome.status,
        WindowStatus::Aborted(AbortReason::MalformedBody(_))
    ));
    assert_eq!(outcome.events.len(), 1000);
}

#[tokio::test(start_paused = true)]
async fn test_non_object_entries_are_kept() {
    let api = FakeApi::scripted(vec![Ok(PageResponse::new(
        200,
        r#"{"data":[{"id":1},"x",null,[1],{"id":2}]}"#,
    ))]);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(outcome.status, WindowStatus::Exhausted);
    assert_eq!(outcome.offset, 5);
    assert_eq!(outcome.events.len(), outcome.offset);
    assert_eq!(ids(&outcome.events), vec![1, 2]);

    let raw: Vec<String> = outcome.events.iter().map(|e| e.to_json()).collect();
    assert_eq!(raw, vec![r#"{"id":1}"#, r#""x""#, "null", "[1]", r#"{"id":2}"#]);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_retried_with_backoff() {
    let api = FakeApi::scripted(vec![Err(timeout()), Err(timeout()), Ok(page(2, 0))]);
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());
    let start = Instant::now();

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(outcome.status, WindowStatus::Exhausted);
    assert_eq!(outcome.events.len(), 2);
    assert_eq!(api.call_count(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(1 + 2));
}

#[tokio::test(start_paused = true)]
async fn test_connection_failures_exhaust_attempts() {
    let api = FakeApi::new(|_, _| Err(timeout()));
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());
    let start = Instant::now();

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert!(matches!(
        outcome.status,
        WindowStatus::Aborted(AbortReason::ConnectionFailures { attempts: 5, .. })
    ));
    assert_eq!(api.call_count(), 5);
    assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 4 + 8));
}

#[tokio::test(start_paused = true)]
async fn test_non_transient_failure_not_retried() {
    let api = FakeApi::new(|_, _| {
        Err(TransportError::new(
            RetryErrorType::RequestInvalid,
            "relative URL without a base",
        ))
    });
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default());

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert!(matches!(
        outcome.status,
        WindowStatus::Aborted(AbortReason::Transport(_))
    ));
    assert_eq!(api.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_quota_governor_spaces_requests() {
    let api = FakeApi::new(|query, _| {
        if query.offset < 2000 {
            Ok(page(1000, query.offset))
        } else {
            Ok(page(1, query.offset))
        }
    });
    let config = EngineConfig {
        quota_requests: 2,
        quota_period: Duration::from_secs(10),
        ..EngineConfig::default()
    };
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), config);
    let start = Instant::now();

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(outcome.events.len(), 2001);
    assert_eq!(api.call_count(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert_eq!(paginator.governor().state().count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_fetch_sends_nothing() {
    let api = FakeApi::new(|_, _| Ok(page(1, 0)));
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default())
        .with_shutdown(shutdown);

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(outcome.status, WindowStatus::Aborted(AbortReason::Cancelled));
    assert_eq!(api.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_429_pause() {
    let api = FakeApi::new(|_, _| Ok(status(429)));
    let shutdown = ShutdownCoordinator::shared();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        trigger.request_shutdown();
    });
    let mut paginator = paginator(api.clone(), FakeAuthority::new(), EngineConfig::default())
        .with_shutdown(shutdown);
    let start = Instant::now();

    let (outcome, _) = paginator
        .fetch_window(hour_window(), Some(10_000), initial_token())
        .await;

    assert_eq!(outcome.status, WindowStatus::Aborted(AbortReason::Cancelled));
    assert_eq!(api.call_count(), 1);
    assert!(start.elapsed() < Duration::from_secs(60));
}
