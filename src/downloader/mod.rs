//! Report orchestration and quota governance
//!
//! # Overview
//!
//! A report run proceeds in four layers:
//!
//! 1. **Job**: the calendar period and time zone, see [`job::ReportJob`]
//! 2. **Execution**: [`executor::ReportExecutor`] walks the hours and writes each
//!    one to an event sink
//! 3. **Hour orchestration**: [`crate::fetcher::pagination::WindowPaginator::fetch_hour`]
//!    falls back to minute windows when an hour is too large
//! 4. **Quota**: every request passes through [`rate_limit::QuotaGovernor`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use umbrella_activity_downloader::downloader::{
//!     EngineConfig, QuotaGovernor, ReportExecutor, ReportJob, ReportPeriod,
//! };
//! use umbrella_activity_downloader::fetcher::activity_http::UmbrellaHttpClient;
//! use umbrella_activity_downloader::fetcher::auth::{ClientCredentials, OAuthTokenAuthority};
//! use umbrella_activity_downloader::fetcher::pagination::WindowPaginator;
//! use umbrella_activity_downloader::fetcher::TokenAuthority;
//! use umbrella_activity_downloader::output::CsvEventSink;
//! use umbrella_activity_downloader::window::ReportTimezone;
//! use umbrella_activity_downloader::OrganizationId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let authority = Arc::new(OAuthTokenAuthority::new(ClientCredentials::new("id", "secret"))?);
//! let token = authority.acquire().await?;
//! let org_id = OrganizationId::from_token(&token)?;
//!
//! let config = EngineConfig::default();
//! let governor = QuotaGovernor::new(config.quota_requests, config.quota_period);
//! let api = UmbrellaHttpClient::new(org_id)?;
//! let paginator = WindowPaginator::new(api, authority, governor, config);
//!
//! let job = ReportJob::new(ReportPeriod::day(2024, 1, 1).unwrap(), ReportTimezone::Utc);
//! let mut sink = CsvEventSink::open("report.csv")?;
//! let (summary, _token) = ReportExecutor::new(paginator).run(&job, token, &mut sink).await?;
//! println!("{} events", summary.total_events);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Retrieval failures never escape the engine: they end a window early and are
//! reported in the [`executor::RunSummary`]. [`DownloadError`] covers the two
//! things that do stop a run: an unusable configuration and a failed sink write.

pub mod config;
pub mod executor;
pub mod job;
pub mod progress;
pub mod rate_limit;

pub use config::{EngineConfig, RetryPolicy};
pub use executor::{HourReport, ReportExecutor, RunSummary};
pub use job::{ReportJob, ReportPeriod};
pub use rate_limit::QuotaGovernor;

use crate::output::OutputError;

/// Errors that stop a report run
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Engine configuration rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Event sink failure
    #[error("output error: {0}")]
    Output(#[from] OutputError),
}
