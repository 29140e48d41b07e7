//! Organization quota governor
//!
//! Counts requests in a fixed window anchored at the first request after a
//! reset. When the budget is spent the caller sleeps until the window ends;
//! requests are delayed, never dropped.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::metrics;

/// Snapshot of the governor's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    /// Start of the current counting window
    pub window_start: Instant,
    /// Requests admitted since `window_start`
    pub count: u32,
}

/// Request-count quota governor.
///
/// Owned by a single retrieval engine and mutated through `&mut self`; share it
/// between concurrent callers only behind a mutex.
#[derive(Debug)]
pub struct QuotaGovernor {
    max_requests: u32,
    period: Duration,
    state: QuotaState,
}

impl QuotaGovernor {
    /// Create a governor admitting `max_requests` per `period`
    pub fn new(max_requests: u32, period: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            period,
            state: QuotaState {
                window_start: Instant::now(),
                count: 0,
            },
        }
    }

    /// Admit one request, sleeping first if the current window is exhausted.
    ///
    /// Call immediately before every request that counts against the quota.
    /// Returns how long the caller was held back.
    pub async fn check(&mut self) -> Duration {
        let now = Instant::now();
        if now.duration_since(self.state.window_start) >= self.period {
            self.reset(now);
        }

        let mut waited = Duration::ZERO;
        if self.state.count >= self.max_requests {
            let elapsed = now.duration_since(self.state.window_start);
            let wait = self.period.saturating_sub(elapsed);
            warn!(
                max_requests = self.max_requests,
                period_secs = self.period.as_secs(),
                wait_secs = wait.as_secs(),
                "Quota reached; waiting for the window to reset"
            );
            sleep(wait).await;
            metrics::record_quota_wait(wait);
            waited = wait;
            self.reset(Instant::now());
        }

        self.state.count += 1;
        debug!(count = self.state.count, max = self.max_requests, "Quota slot admitted");
        waited
    }

    /// Current counters
    pub fn state(&self) -> QuotaState {
        self.state
    }

    fn reset(&mut self, now: Instant) {
        self.state = QuotaState {
            window_start: now,
            count: 0,
        };
    }
}
