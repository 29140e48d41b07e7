//! Production observability metrics for the activity downloader
//!
//! Counters and histograms describing how the retrieval engine interacts with
//! the reporting API: request outcomes, token renewals, quota rejections,
//! subdivisions and aborted windows.
//!
//! ## Architecture
//!
//! - Uses the `metrics` facade; recording is a no-op until a recorder is installed
//! - [`init_metrics`] installs a Prometheus exporter with an HTTP scrape endpoint

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

static METRICS_INITIALIZED: OnceCell<SocketAddr> = OnceCell::new();

/// Metrics initialization errors
#[derive(Debug, thiserror::Error)]
#[error("failed to install Prometheus exporter: {0}")]
pub struct MetricsError(String);

/// Install the Prometheus exporter and register metric descriptions.
///
/// Idempotent: a second call is ignored. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = METRICS_INITIALIZED.get() {
        debug!("Metrics already initialized on {}, skipping", existing);
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError(e.to_string()))?;

    describe_counter!(
        "activity_requests_total",
        Unit::Count,
        "Activity page requests that produced an HTTP response, by status"
    );
    describe_counter!(
        "activity_transient_failures_total",
        Unit::Count,
        "Page requests that failed before a response arrived"
    );
    describe_counter!(
        "activity_token_refreshes_total",
        Unit::Count,
        "Token renewals attempted after HTTP 403, by outcome"
    );
    describe_counter!(
        "activity_quota_rejections_total",
        Unit::Count,
        "HTTP 429 responses received from the API"
    );
    describe_counter!(
        "activity_subdivisions_total",
        Unit::Count,
        "Windows that had to be re-fetched at finer granularity, by reason"
    );
    describe_counter!(
        "activity_windows_aborted_total",
        Unit::Count,
        "Windows abandoned with partial results, by reason"
    );
    describe_counter!(
        "activity_events_total",
        Unit::Count,
        "Events retrieved"
    );
    describe_histogram!(
        "quota_wait_seconds",
        Unit::Seconds,
        "Time spent blocked by the local quota governor"
    );

    let _ = METRICS_INITIALIZED.set(addr);
    info!("Metrics system initialized on {}", addr);
    Ok(())
}

/// An HTTP response arrived for a page request
pub fn record_request(status: u16) {
    counter!("activity_requests_total", "status" => status.to_string()).increment(1);
}

/// A page request failed before any response
pub fn record_transient_failure() {
    counter!("activity_transient_failures_total").increment(1);
}

/// A token renewal was attempted
pub fn record_token_refresh(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("activity_token_refreshes_total", "outcome" => outcome).increment(1);
}

/// The API answered HTTP 429
pub fn record_quota_rejection() {
    counter!("activity_quota_rejections_total").increment(1);
}

/// A window needs subdivision
pub fn record_subdivision(reason: &'static str) {
    counter!("activity_subdivisions_total", "reason" => reason).increment(1);
}

/// A window was abandoned
pub fn record_window_aborted(reason: &'static str) {
    counter!("activity_windows_aborted_total", "reason" => reason).increment(1);
}

/// Events were retrieved
pub fn record_events(count: usize) {
    counter!("activity_events_total").increment(count as u64);
}

/// The quota governor blocked the caller
pub fn record_quota_wait(wait: Duration) {
    histogram!("quota_wait_seconds").record(wait.as_secs_f64());
}
