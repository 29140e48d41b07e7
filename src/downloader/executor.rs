//! Hour orchestration and the report driver
//!
//! [`WindowPaginator::fetch_hour`] turns one clock hour into a complete event
//! list: the hour is fetched as a single window under the offset ceiling, and
//! if the API cannot serve it that way the hour is re-fetched as 60 one-minute
//! windows with no ceiling. Only the minute results are kept in that case.
//!
//! [`ReportExecutor`] walks every hour of a [`ReportJob`] in order, writes each
//! hour's events to an [`EventSink`] and threads the bearer token from one
//! hour to the next.

use chrono::{DateTime, NaiveDate, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::downloader::job::{ReportHour, ReportJob};
use crate::downloader::progress::{format_duration, RunProgress};
use crate::downloader::DownloadError;
use crate::fetcher::pagination::{AbortReason, SubdivisionReason, WindowPaginator, WindowStatus};
use crate::fetcher::{ActivityApi, BearerToken, TokenAuthority};
use crate::output::EventSink;
use crate::shutdown::SharedShutdown;
use crate::window::{TimeWindow, MINUTES_PER_HOUR};
use crate::ActivityEvent;

/// Why part of an hour could not be retrieved completely
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncompleteReason {
    /// The window was abandoned
    Aborted(AbortReason),
    /// A minute window still asked for subdivision; there is no finer level
    StillTooLarge(SubdivisionReason),
}

impl std::fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aborted(reason) => write!(f, "aborted: {reason}"),
            Self::StillTooLarge(reason) => write!(f, "minute window still too large: {reason}"),
        }
    }
}

/// A window whose results are partial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteWindow {
    /// Hour or minute window affected
    pub window: TimeWindow,
    /// What went wrong
    pub reason: IncompleteReason,
    /// Events kept from the window
    pub events_kept: usize,
}

/// Everything retrieved for one clock hour
#[derive(Debug, Clone)]
pub struct HourReport {
    /// The hour window
    pub window: TimeWindow,
    /// Events in retrieval order (minute order when subdivided)
    pub events: Vec<ActivityEvent>,
    /// Whether the hour fell back to minute windows
    pub subdivided: bool,
    /// Windows with partial results
    pub incomplete: Vec<IncompleteWindow>,
}

impl HourReport {
    /// Whether every window of the hour was retrieved completely
    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty()
    }

    /// Whether the hour was cut short by shutdown
    pub fn was_cancelled(&self) -> bool {
        self.incomplete
            .iter()
            .any(|w| w.reason == IncompleteReason::Aborted(AbortReason::Cancelled))
    }
}

impl<A: ActivityApi, T: TokenAuthority> WindowPaginator<A, T> {
    /// Retrieve one clock hour, falling back to minute windows when needed.
    ///
    /// # Arguments
    /// * `hour_start` - Instant the hour begins
    /// * `token` - Current bearer token
    ///
    /// # Returns
    /// The hour's events plus the token to use for the next hour
    pub async fn fetch_hour(
        &mut self,
        hour_start: DateTime<Utc>,
        token: BearerToken,
    ) -> (HourReport, BearerToken) {
        let window = TimeWindow::hour(&hour_start);
        info!("Fetching hour {}", window);

        let ceiling = self.config().offset_ceiling;
        let (outcome, mut token) = self.fetch_window(window, ceiling, token).await;

        let reason = match outcome.status {
            WindowStatus::NeedsSubdivision(reason) => reason,
            WindowStatus::Exhausted => {
                info!("Hour OK: {} events", outcome.events.len());
                let report = HourReport {
                    window,
                    events: outcome.events,
                    subdivided: false,
                    incomplete: Vec::new(),
                };
                return (report, token);
            }
            WindowStatus::Aborted(reason) => {
                let events_kept = outcome.events.len();
                warn!(
                    "Hour {} incomplete ({}), keeping {} events",
                    window, reason, events_kept
                );
                let report = HourReport {
                    window,
                    events: outcome.events,
                    subdivided: false,
                    incomplete: vec![IncompleteWindow {
                        window,
                        reason: IncompleteReason::Aborted(reason),
                        events_kept,
                    }],
                };
                return (report, token);
            }
        };

        warn!(
            "Falling back to {} minute windows for {} ({}); \
             discarding {} events from the hour query",
            MINUTES_PER_HOUR,
            window,
            reason,
            outcome.events.len()
        );

        let mut events = Vec::new();
        let mut incomplete = Vec::new();

        for minute in window.minutes() {
            if self.is_cancelled() {
                incomplete.push(IncompleteWindow {
                    window: minute,
                    reason: IncompleteReason::Aborted(AbortReason::Cancelled),
                    events_kept: 0,
                });
                break;
            }

            let (minute_outcome, renewed) = self.fetch_window(minute, None, token).await;
            token = renewed;
            debug!(%minute, events = minute_outcome.events.len(), "Minute fetched");

            let events_kept = minute_outcome.events.len();
            match minute_outcome.status {
                WindowStatus::Exhausted => {}
                WindowStatus::NeedsSubdivision(reason) => {
                    warn!(
                        "Minute {} still rejected ({}), keeping {} events",
                        minute, reason, events_kept
                    );
                    incomplete.push(IncompleteWindow {
                        window: minute,
                        reason: IncompleteReason::StillTooLarge(reason),
                        events_kept,
                    });
                }
                WindowStatus::Aborted(reason) => {
                    warn!(
                        "Minute {} incomplete ({}), keeping {} events",
                        minute, reason, events_kept
                    );
                    incomplete.push(IncompleteWindow {
                        window: minute,
                        reason: IncompleteReason::Aborted(reason),
                        events_kept,
                    });
                }
            }
            events.extend(minute_outcome.events);
        }

        info!("Fallback minute total: {} events for {}", events.len(), window);
        let report = HourReport {
            window,
            events,
            subdivided: true,
            incomplete,
        };
        (report, token)
    }
}

/// Per-hour summary handed to the progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourSummary {
    /// Hour processed
    pub hour: ReportHour,
    /// Events written for the hour
    pub events: usize,
    /// Whether the hour fell back to minute windows
    pub subdivided: bool,
    /// Whether every window of the hour was retrieved completely
    pub complete: bool,
}

/// An hour with partial results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteHour {
    /// Hour affected
    pub hour: ReportHour,
    /// Windows with partial results
    pub windows: Vec<IncompleteWindow>,
}

/// Outcome of a report run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Events written to the sink
    pub total_events: u64,
    /// Hours fetched
    pub hours_processed: usize,
    /// Hours that fell back to minute windows
    pub hours_subdivided: usize,
    /// Hours with partial results
    pub incomplete_hours: Vec<IncompleteHour>,
    /// Wall-clock hours that do not exist in the report time zone
    pub skipped_hours: Vec<(NaiveDate, u32)>,
    /// Whether the run stopped early on shutdown
    pub cancelled: bool,
    /// Run duration
    pub elapsed: Duration,
}

impl RunSummary {
    /// Whether every hour of the report was retrieved completely
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.incomplete_hours.is_empty()
    }
}

type HourCallback = Box<dyn FnMut(&HourSummary) + Send>;

/// Drives a [`WindowPaginator`] over every hour of a report
pub struct ReportExecutor<A, T> {
    paginator: WindowPaginator<A, T>,
    shutdown: Option<SharedShutdown>,
    on_hour: Option<HourCallback>,
}

impl<A: ActivityApi, T: TokenAuthority> ReportExecutor<A, T> {
    /// Create an executor around a paginator
    pub fn new(paginator: WindowPaginator<A, T>) -> Self {
        Self {
            paginator,
            shutdown: None,
            on_hour: None,
        }
    }

    /// Stop between hours, and interrupt waits, once `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.paginator = self.paginator.with_shutdown(shutdown.clone());
        self.shutdown = Some(shutdown);
        self
    }

    /// Call `callback` after every hour has been written
    pub fn with_hour_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&HourSummary) + Send + 'static,
    {
        self.on_hour = Some(Box::new(callback));
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Retrieve every hour of `job` and append it to `sink`.
    ///
    /// Retrieval problems never fail the run; they are reported in the
    /// summary. Only an invalid configuration or a sink write error returns
    /// `Err`.
    pub async fn run<S: EventSink + ?Sized>(
        &mut self,
        job: &ReportJob,
        token: BearerToken,
        sink: &mut S,
    ) -> Result<(RunSummary, BearerToken), DownloadError> {
        self.paginator
            .config()
            .validate()
            .map_err(DownloadError::InvalidConfig)?;

        let hours = job.hours();
        let mut progress = RunProgress::new(hours.len());
        let mut summary = RunSummary::default();
        let mut token = token;
        let mut current_day: Option<NaiveDate> = None;

        info!(
            period = %job.period,
            timezone = %job.timezone,
            hours = hours.len(),
            "Starting report run"
        );

        for hour in hours {
            if self.shutdown_requested() {
                info!("Shutdown requested - stopping before {}", hour);
                summary.cancelled = true;
                break;
            }

            if current_day != Some(hour.date) {
                current_day = Some(hour.date);
                info!("Day: {}", hour.date);
            }

            let Some(start) = hour.start else {
                warn!(
                    "Hour {} does not exist in the {} time zone, skipping",
                    hour, job.timezone
                );
                summary.skipped_hours.push((hour.date, hour.hour));
                progress.record_hour(0, false, true);
                if let Some(callback) = self.on_hour.as_mut() {
                    callback(&HourSummary {
                        hour,
                        events: 0,
                        subdivided: false,
                        complete: true,
                    });
                }
                continue;
            };

            progress.set_phase(Some(hour.to_string()));
            let (report, renewed) = self.paginator.fetch_hour(start, token).await;
            token = renewed;

            sink.write_events(&report.events)?;

            let complete = report.is_complete();
            let cancelled = report.was_cancelled();
            summary.total_events += report.events.len() as u64;
            summary.hours_processed += 1;
            if report.subdivided {
                summary.hours_subdivided += 1;
            }
            if !complete {
                warn!(
                    "Hour {} written with {} incomplete window(s)",
                    hour,
                    report.incomplete.len()
                );
                summary.incomplete_hours.push(IncompleteHour {
                    hour,
                    windows: report.incomplete.clone(),
                });
            }

            progress.record_hour(report.events.len(), report.subdivided, complete);
            info!("{}", progress.format_progress());

            if let Some(callback) = self.on_hour.as_mut() {
                callback(&HourSummary {
                    hour,
                    events: report.events.len(),
                    subdivided: report.subdivided,
                    complete,
                });
            }

            if cancelled {
                info!("Shutdown requested - stopping after partial hour {}", hour);
                summary.cancelled = true;
                break;
            }
        }

        summary.elapsed = progress.start_time.elapsed();
        info!(
            total_events = summary.total_events,
            hours = summary.hours_processed,
            subdivided = summary.hours_subdivided,
            incomplete = summary.incomplete_hours.len(),
            "Report run finished in {}",
            format_duration(summary.elapsed)
        );
        Ok((summary, token))
    }
}
