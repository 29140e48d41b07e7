//! Time windows aligned to clock hours and minutes
//!
//! Windows are inclusive on both ends with millisecond precision, matching the
//! `from`/`to` semantics of the activity endpoint: the hour starting at 00:00
//! covers `[00:00:00.000, 00:59:59.999]`.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

/// Milliseconds in one minute
pub const MINUTE_MS: i64 = 60_000;

/// Milliseconds in one hour
pub const HOUR_MS: i64 = 60 * MINUTE_MS;

/// Number of one-minute sub-windows in an hour
pub const MINUTES_PER_HOUR: u32 = 60;

/// Inclusive `[start, end]` interval in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    start_ms: i64,
    end_ms: i64,
}

impl TimeWindow {
    /// Build a window from raw bounds. Returns `None` when `start_ms > end_ms`.
    pub fn new(start_ms: i64, end_ms: i64) -> Option<Self> {
        (start_ms <= end_ms).then_some(Self { start_ms, end_ms })
    }

    /// Window covering one clock hour starting at `hour_start`
    pub fn hour<Tz: TimeZone>(hour_start: &DateTime<Tz>) -> Self {
        let start_ms = hour_start.timestamp_millis();
        Self {
            start_ms,
            end_ms: start_ms + HOUR_MS - 1,
        }
    }

    /// The 60 one-minute sub-windows of this window's first hour, in order
    pub fn minutes(&self) -> impl Iterator<Item = TimeWindow> {
        let start_ms = self.start_ms;
        (0..i64::from(MINUTES_PER_HOUR)).map(move |m| {
            let minute_start = start_ms + m * MINUTE_MS;
            TimeWindow {
                start_ms: minute_start,
                end_ms: minute_start + MINUTE_MS - 1,
            }
        })
    }

    /// Start (epoch milliseconds, inclusive)
    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    /// End (epoch milliseconds, inclusive)
    pub fn end_ms(&self) -> i64 {
        self.end_ms
    }

    /// Start as a UTC datetime
    pub fn start(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start_ms)
    }

    /// End as a UTC datetime
    pub fn end(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.end_ms)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start(), self.end()) {
            (Some(start), Some(end)) => write!(
                f,
                "{} to {}",
                start.format("%Y-%m-%d %H:%M:%S%.3f"),
                end.format("%Y-%m-%d %H:%M:%S%.3f")
            ),
            _ => write!(f, "{} to {}", self.start_ms, self.end_ms),
        }
    }
}

/// Time zone in which report hours are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportTimezone {
    /// Host local time (hour boundaries follow the operator's wall clock)
    #[default]
    Local,
    /// Coordinated Universal Time
    Utc,
}

impl ReportTimezone {
    /// Every instant at which the civil hour `hour` of `date` begins.
    ///
    /// Empty for a DST gap, two instants for a DST overlap (the wall-clock hour
    /// happens twice), one otherwise.
    pub fn hour_starts(&self, date: NaiveDate, hour: u32) -> Vec<DateTime<Utc>> {
        let Some(naive) = date.and_hms_opt(hour, 0, 0) else {
            return Vec::new();
        };
        match self {
            ReportTimezone::Utc => vec![naive.and_utc()],
            ReportTimezone::Local => {
                let mapped = Local.from_local_datetime(&naive);
                let mut starts: Vec<DateTime<Utc>> = mapped
                    .earliest()
                    .into_iter()
                    .chain(mapped.latest())
                    .map(|dt| dt.with_timezone(&Utc))
                    .collect();
                starts.dedup();
                starts
            }
        }
    }
}

impl fmt::Display for ReportTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportTimezone::Local => write!(f, "local"),
            ReportTimezone::Utc => write!(f, "utc"),
        }
    }
}

impl FromStr for ReportTimezone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(ReportTimezone::Local),
            "utc" => Ok(ReportTimezone::Utc),
            _ => Err(format!("Invalid timezone: {s}. Valid options: local, utc")),
        }
    }
}
