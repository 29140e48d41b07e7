//! Report period and job structures

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt;

use crate::window::ReportTimezone;

/// Hours in a civil day
pub const HOURS_PER_DAY: u32 = 24;

/// Calendar span covered by one report: a whole month or a single day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportPeriod {
    year: i32,
    month: u32,
    day: Option<u32>,
}

impl ReportPeriod {
    /// Whole calendar month. Returns `None` for an invalid month.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self {
            year,
            month,
            day: None,
        })
    }

    /// Single day. Returns `None` for a date that does not exist.
    pub fn day(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Self {
            year,
            month,
            day: Some(day),
        })
    }

    /// Days covered, in ascending order
    pub fn days(&self) -> Vec<NaiveDate> {
        if let Some(day) = self.day {
            return NaiveDate::from_ymd_opt(self.year, self.month, day)
                .into_iter()
                .collect();
        }
        let Some(first) = NaiveDate::from_ymd_opt(self.year, self.month, 1) else {
            return Vec::new();
        };
        first
            .iter_days()
            .take_while(|d| d.month() == self.month)
            .collect()
    }

    /// `YYYYMMDD` for a day, `YYYYMM` for a month
    pub fn label(&self) -> String {
        match self.day {
            Some(day) => format!("{:04}{:02}{:02}", self.year, self.month, day),
            None => format!("{:04}{:02}", self.year, self.month),
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.day {
            Some(day) => write!(f, "{:04}-{:02}-{:02}", self.year, self.month, day),
            None => write!(f, "{:04}-{:02}", self.year, self.month),
        }
    }
}

/// One civil hour of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportHour {
    /// Civil date
    pub date: NaiveDate,
    /// Hour of day (0-23)
    pub hour: u32,
    /// Instant the hour starts; `None` when it does not exist (DST gap)
    pub start: Option<DateTime<Utc>>,
}

impl fmt::Display for ReportHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}:00", self.date, self.hour)
    }
}

/// Download job: a period interpreted in a time zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportJob {
    /// Calendar span
    pub period: ReportPeriod,
    /// Zone in which hour boundaries are computed
    pub timezone: ReportTimezone,
}

impl ReportJob {
    /// Create a job
    pub fn new(period: ReportPeriod, timezone: ReportTimezone) -> Self {
        Self { period, timezone }
    }

    /// Every hour of the period: days ascending, hours 0-23 within each day.
    ///
    /// A wall-clock hour that occurs twice (DST overlap) is listed twice, once
    /// per instant; one that never occurs (DST gap) is listed without a start.
    pub fn hours(&self) -> Vec<ReportHour> {
        self.period
            .days()
            .into_iter()
            .flat_map(|date| (0..HOURS_PER_DAY).map(move |hour| (date, hour)))
            .flat_map(|(date, hour)| {
                let starts = self.timezone.hour_starts(date, hour);
                if starts.is_empty() {
                    vec![ReportHour {
                        date,
                        hour,
                        start: None,
                    }]
                } else {
                    starts
                        .into_iter()
                        .map(|start| ReportHour {
                            date,
                            hour,
                            start: Some(start),
                        })
                        .collect()
                }
            })
            .collect()
    }

    /// Number of hours in the period
    pub fn total_hours(&self) -> usize {
        self.hours().len()
    }
}
