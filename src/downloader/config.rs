//! Engine configuration constants

use std::time::Duration;

/// Default page size (`limit` query parameter).
/// 1000 is the largest page the activity endpoint serves.
pub const DEFAULT_PAGE_LIMIT: usize = 1000;

/// Default offset ceiling for a single window.
/// The activity endpoint refuses offsets past 10,000 for one query.
pub const DEFAULT_OFFSET_CEILING: usize = 10_000;

/// Default organization quota: requests per period
pub const DEFAULT_QUOTA_REQUESTS: u32 = 1000;

/// Default organization quota period (one hour)
pub const DEFAULT_QUOTA_PERIOD: Duration = Duration::from_secs(3600);

/// Attempts per page for transient network failures
pub const MAX_CONNECT_ATTEMPTS: u32 = 5;

/// Consecutive HTTP 403 responses tolerated for one window
pub const MAX_CONSECUTIVE_AUTH_FAILURES: u32 = 5;

/// Pause after a failed token renewal
pub const AUTH_RETRY_PAUSE: Duration = Duration::from_secs(5);

/// Pause after an HTTP 429 from the API
pub const QUOTA_REJECTION_PAUSE: Duration = Duration::from_secs(60);

/// Pause after failed connection attempt `attempt` (0-based): 1s, 2s, 4s, 8s...
pub fn connect_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

/// Retry limits and pauses applied by the window paginator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per page for transient network failures
    pub max_connect_attempts: u32,
    /// Consecutive HTTP 403 responses before the window is abandoned
    pub max_consecutive_auth_failures: u32,
    /// Pause after a failed token renewal
    pub auth_retry_pause: Duration,
    /// Pause after an HTTP 429
    pub quota_rejection_pause: Duration,
    /// Cap on consecutive HTTP 429 retries for one page; `None` retries forever
    pub max_quota_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_connect_attempts: MAX_CONNECT_ATTEMPTS,
            max_consecutive_auth_failures: MAX_CONSECUTIVE_AUTH_FAILURES,
            auth_retry_pause: AUTH_RETRY_PAUSE,
            quota_rejection_pause: QUOTA_REJECTION_PAUSE,
            max_quota_retries: None,
        }
    }
}

/// Full retrieval-engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Page size
    pub page_limit: usize,
    /// Offset ceiling applied to full-hour windows; `None` disables the check
    pub offset_ceiling: Option<usize>,
    /// Quota: requests per period
    pub quota_requests: u32,
    /// Quota period
    pub quota_period: Duration,
    /// Retry limits
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            offset_ceiling: Some(DEFAULT_OFFSET_CEILING),
            quota_requests: DEFAULT_QUOTA_REQUESTS,
            quota_period: DEFAULT_QUOTA_PERIOD,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<(), String> {
        if self.page_limit == 0 {
            return Err("page size must be at least 1".to_string());
        }
        if self.offset_ceiling == Some(0) {
            return Err("offset ceiling must be at least 1".to_string());
        }
        if self.quota_requests == 0 {
            return Err("quota must allow at least 1 request".to_string());
        }
        if self.quota_period.is_zero() {
            return Err("quota period must be positive".to_string());
        }
        if self.retry.max_connect_attempts == 0 {
            return Err("connection attempts must be at least 1".to_string());
        }
        if self.retry.max_consecutive_auth_failures == 0 {
            return Err("consecutive 403 limit must be at least 1".to_string());
        }
        Ok(())
    }
}
