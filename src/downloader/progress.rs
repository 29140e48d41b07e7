//! Progress tracking for report runs.
//!
//! A run walks a fixed list of hours, so completion is measured in hours and
//! the remaining time is extrapolated from the average time per hour so far.

use std::time::Duration;
use tokio::time::Instant;

/// Progress state of one report run.
#[derive(Debug, Clone)]
pub struct RunProgress {
    /// Hours in the report
    pub hours_total: usize,
    /// Hours processed so far
    pub hours_done: usize,
    /// Events written so far
    pub events_written: u64,
    /// Hours that fell back to minute windows
    pub hours_subdivided: usize,
    /// Hours with at least one incomplete window
    pub hours_incomplete: usize,
    /// Timestamp when the run started
    pub start_time: Instant,
    /// Label of the hour being processed (e.g. "2024-01-01 05:00")
    pub current_phase: Option<String>,
}

impl RunProgress {
    /// Start tracking a run of `hours_total` hours.
    pub fn new(hours_total: usize) -> Self {
        Self {
            hours_total,
            hours_done: 0,
            events_written: 0,
            hours_subdivided: 0,
            hours_incomplete: 0,
            start_time: Instant::now(),
            current_phase: None,
        }
    }

    /// Record a finished hour.
    pub fn record_hour(&mut self, events: usize, subdivided: bool, complete: bool) {
        self.hours_done += 1;
        self.events_written = self.events_written.saturating_add(events as u64);
        if subdivided {
            self.hours_subdivided += 1;
        }
        if !complete {
            self.hours_incomplete += 1;
        }
    }

    /// Set descriptive phase label.
    pub fn set_phase<S: Into<String>>(&mut self, phase: Option<S>) {
        self.current_phase = phase.map(|s| s.into());
    }

    /// Completion percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.hours_total == 0 {
            return 100.0;
        }
        self.hours_done as f64 / self.hours_total as f64 * 100.0
    }

    /// Events per second since the run started.
    pub fn rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.events_written as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Remaining time extrapolated from the average hour so far.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        if self.hours_done == 0 || self.hours_done >= self.hours_total {
            return None;
        }
        let per_hour = self.start_time.elapsed().as_secs_f64() / self.hours_done as f64;
        let remaining = (self.hours_total - self.hours_done) as f64 * per_hour;
        Some(Duration::from_secs_f64(remaining))
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] Hour {}/{} - {} events - {:.1}% complete",
            self.hours_done,
            self.hours_total,
            self.events_written,
            self.percentage()
        )];

        if let Some(phase) = &self.current_phase {
            parts.push(format!("({phase})"));
        }

        let rate = self.rate();
        if rate > 0.0 {
            parts.push(format!("at {rate:.0} events/sec"));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

/// Compact duration rendering ("45s", "12m", "3.5h").
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
