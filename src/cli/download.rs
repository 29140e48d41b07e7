//! Download command implementation

use chrono::Local;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::prompt::{prompt_period, prompt_secret, prompt_text};
use super::CliError;
use crate::downloader::config::{
    DEFAULT_OFFSET_CEILING, DEFAULT_PAGE_LIMIT, DEFAULT_QUOTA_PERIOD, DEFAULT_QUOTA_REQUESTS,
};
use crate::downloader::executor::{HourSummary, RunSummary};
use crate::downloader::{
    EngineConfig, QuotaGovernor, ReportExecutor, ReportJob, ReportPeriod, RetryPolicy,
};
use crate::fetcher::activity_http::{UmbrellaHttpClient, DEFAULT_REPORTS_BASE_URL};
use crate::fetcher::auth::{ClientCredentials, OAuthTokenAuthority, DEFAULT_TOKEN_URL};
use crate::fetcher::pagination::WindowPaginator;
use crate::fetcher::{BearerToken, TokenAuthority};
use crate::identity::OrganizationId;
use crate::output::{CsvEventSink, ReportFileName};
use crate::shutdown::SharedShutdown;
use crate::window::ReportTimezone;

/// Umbrella activity downloader CLI
#[derive(Parser, Debug)]
#[command(name = "umbrella-activity-downloader")]
#[command(
    about = "Download security activity reports from the Umbrella reporting API",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// API key (prompted when absent)
    #[arg(long, global = true, env = "UMBRELLA_CLIENT_ID")]
    pub client_id: Option<String>,

    /// API secret (prompted when absent)
    #[arg(long, global = true, env = "UMBRELLA_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// OAuth2 token endpoint
    #[arg(long, global = true, default_value = DEFAULT_TOKEN_URL)]
    pub token_url: String,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the activity report for a day or a month
    Download(DownloadArgs),

    /// Check the credentials and show the organization they belong to
    Verify(super::VerifyCommand),
}

impl Cli {
    /// Credentials from flags or environment, prompting for what is missing
    pub fn credentials(&self) -> Result<ClientCredentials, CliError> {
        let client_id = match self.client_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => prompt_text("API key")?,
        };
        if client_id.is_empty() {
            return Err(CliError::InvalidArgument("API key cannot be empty".to_string()));
        }
        let client_secret = match self.client_secret.as_deref() {
            Some(secret) if !secret.trim().is_empty() => secret.trim().to_string(),
            _ => prompt_secret("API secret")?,
        };
        Ok(ClientCredentials::new(client_id, client_secret))
    }

    /// Token authority for the configured endpoint
    pub fn authority(&self) -> Result<OAuthTokenAuthority, CliError> {
        let credentials = self.credentials()?;
        Ok(OAuthTokenAuthority::with_token_url(credentials, self.token_url.clone())?)
    }
}

/// Arguments of the download command
#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// Report year (prompted together with month and day when absent)
    #[arg(long)]
    pub year: Option<i32>,

    /// Report month (1-12)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: Option<u32>,

    /// Report day; omit for the whole month
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=31))]
    pub day: Option<u32>,

    /// Organization id; derived from the token when absent
    #[arg(long)]
    pub org_id: Option<String>,

    /// Time zone in which report hours are interpreted (local or utc)
    #[arg(long, default_value = "local")]
    pub timezone: ReportTimezone,

    /// Directory the CSV report is written to
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Events per page
    #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
    pub page_size: usize,

    /// Offset at which an hour is re-fetched minute by minute
    #[arg(long, default_value_t = DEFAULT_OFFSET_CEILING)]
    pub offset_ceiling: usize,

    /// Requests allowed per quota period
    #[arg(long, default_value_t = DEFAULT_QUOTA_REQUESTS)]
    pub quota_requests: u32,

    /// Quota period in seconds
    #[arg(long, default_value_t = DEFAULT_QUOTA_PERIOD.as_secs())]
    pub quota_seconds: u64,

    /// Give up on a page after this many consecutive HTTP 429 responses
    /// (retries forever when absent)
    #[arg(long)]
    pub max_quota_retries: Option<u32>,

    /// Base URL of the reporting API
    #[arg(long, default_value = DEFAULT_REPORTS_BASE_URL)]
    pub api_base_url: String,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl DownloadArgs {
    /// Engine configuration from the command-line values
    pub fn engine_config(&self) -> Result<EngineConfig, CliError> {
        let config = EngineConfig {
            page_limit: self.page_size,
            offset_ceiling: Some(self.offset_ceiling),
            quota_requests: self.quota_requests,
            quota_period: Duration::from_secs(self.quota_seconds),
            retry: RetryPolicy {
                max_quota_retries: self.max_quota_retries,
                ..RetryPolicy::default()
            },
        };
        config.validate().map_err(CliError::InvalidArgument)?;
        Ok(config)
    }

    /// Report period from the flags; `None` when the operator must be asked
    pub fn period(&self) -> Result<Option<ReportPeriod>, CliError> {
        match (self.year, self.month, self.day) {
            (None, None, None) => Ok(None),
            (Some(year), Some(month), None) => ReportPeriod::month(year, month)
                .map(Some)
                .ok_or_else(|| {
                    CliError::InvalidArgument(format!("invalid month {year}-{month:02}"))
                }),
            (Some(year), Some(month), Some(day)) => ReportPeriod::day(year, month, day)
                .map(Some)
                .ok_or_else(|| {
                    CliError::InvalidArgument(format!(
                        "{year}-{month:02}-{day:02} is not a valid date"
                    ))
                }),
            _ => Err(CliError::InvalidArgument(
                "--year and --month must be given together (--day is optional)".to_string(),
            )),
        }
    }

    /// Execute the download command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = self.engine_config()?;
        let org_override = self
            .org_id
            .as_deref()
            .map(OrganizationId::parse)
            .transpose()?;
        let period = match self.period()? {
            Some(period) => period,
            None => prompt_period()?,
        };

        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)?;
        }

        let authority = Arc::new(cli.authority()?);
        let token = authority.acquire().await?;
        info!("Authenticated against {}", authority.token_url());

        let org_id = match org_override {
            Some(org_id) => org_id,
            None => OrganizationId::from_token(&token)?,
        };
        info!("Organization: {}", org_id);

        let path = ReportFileName::new(&org_id, period, Local::now().date_naive())
            .path_in(&self.output_dir);
        let mut sink = CsvEventSink::open(&path)?;

        let api = UmbrellaHttpClient::with_base_url(org_id, &self.api_base_url)?;
        let governor = QuotaGovernor::new(config.quota_requests, config.quota_period);
        let paginator = WindowPaginator::new(api, authority, governor, config);

        let job = ReportJob::new(period, self.timezone);
        let progress_bar = create_progress_bar(&job);
        let bar = progress_bar.clone();
        let mut executor = ReportExecutor::new(paginator)
            .with_shutdown(shutdown)
            .with_hour_callback(move |hour: &HourSummary| {
                bar.inc(1);
                bar.set_message(format!("{} ({} events)", hour.hour, hour.events));
            });

        info!("Writing report {} to {}", period, path.display());
        let result = executor.run(&job, token, &mut sink).await;
        progress_bar.finish_and_clear();
        let (summary, _token): (RunSummary, BearerToken) = result?;

        report_summary(&summary, &path);
        if summary.cancelled {
            return Err(CliError::Cancelled);
        }
        Ok(())
    }
}

fn report_summary(summary: &RunSummary, path: &std::path::Path) {
    println!(
        "Done: {} events from {} hour(s) saved to {}",
        summary.total_events,
        summary.hours_processed,
        path.display()
    );
    if summary.hours_subdivided > 0 {
        println!(
            "  {} hour(s) were fetched minute by minute",
            summary.hours_subdivided
        );
    }
    for (date, hour) in &summary.skipped_hours {
        println!("  {date} {hour:02}:00 does not exist in this time zone (skipped)");
    }
    for incomplete in &summary.incomplete_hours {
        warn!(
            "Hour {} is incomplete: {} window(s) with partial results",
            incomplete.hour,
            incomplete.windows.len()
        );
        for window in &incomplete.windows {
            println!(
                "  [INCOMPLETE] {} - {} ({} events kept)",
                window.window, window.reason, window.events_kept
            );
        }
    }
}

/// Progress bar counting report hours
fn create_progress_bar(job: &ReportJob) -> ProgressBar {
    let pb = ProgressBar::new(job.total_hours() as u64);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
             {pos}/{len} hours ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(format!("Downloading {}", job.period));
    pb
}
