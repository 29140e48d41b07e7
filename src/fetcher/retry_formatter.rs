//! Failure classification and retry message formatting.
//!
//! Every request failure seen by the paginator is mapped to a
//! [`RetryErrorType`], which decides whether the request is worth repeating
//! and supplies the wording of the operator-facing log lines.

use reqwest::Error as ReqwestError;
use std::time::Duration;

use crate::window::TimeWindow;

/// Classification of request failures for retry decisions and user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Read or connect timeout
    NetworkTimeout,
    /// Connection refused, reset, DNS failure
    NetworkOffline,
    /// Response body ended early or could not be read
    TruncatedBody,
    /// Other failure while sending the request
    NetworkGeneric,
    /// Request could not be built or followed (bad URL, redirect loop)
    RequestInvalid,
    /// HTTP 403: bearer token rejected
    AuthRejected,
    /// HTTP 429: organization quota exceeded upstream
    QuotaExceeded,
    /// HTTP 400/404: window or offset refused for this query
    WindowRejected(u16),
    /// Any other unexpected status
    UnexpectedStatus(u16),
}

impl RetryErrorType {
    /// Classify an HTTP status that is not 200
    pub fn from_status(status: u16) -> Self {
        match status {
            403 => Self::AuthRejected,
            429 => Self::QuotaExceeded,
            400 | 404 => Self::WindowRejected(status),
            _ => Self::UnexpectedStatus(status),
        }
    }

    /// Classify a transport-level reqwest error
    pub fn from_reqwest(err: &ReqwestError) -> Self {
        if err.is_timeout() {
            Self::NetworkTimeout
        } else if err.is_connect() {
            Self::NetworkOffline
        } else if err.is_body() || err.is_decode() {
            Self::TruncatedBody
        } else if err.is_builder() || err.is_redirect() {
            Self::RequestInvalid
        } else {
            Self::NetworkGeneric
        }
    }

    /// Whether resending the identical request can help
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout | Self::NetworkOffline | Self::TruncatedBody | Self::NetworkGeneric
        )
    }

    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::TruncatedBody => "truncated response",
            Self::NetworkGeneric => "network error",
            Self::RequestInvalid => "invalid request",
            Self::AuthRejected => "token rejected (403)",
            Self::QuotaExceeded => "quota exceeded (429)",
            Self::WindowRejected(400) => "window rejected (400)",
            Self::WindowRejected(404) => "window rejected (404)",
            Self::WindowRejected(_) => "window rejected",
            Self::UnexpectedStatus(code) if *code >= 500 => "server error",
            Self::UnexpectedStatus(_) => "unexpected status",
        }
    }

    /// Suggested remediation presented with failures.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection and firewall settings",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::TruncatedBody | Self::NetworkGeneric => {
                "Check network connectivity and re-run the hour"
            }
            Self::RequestInvalid => "Check --api-base-url and the organization id",
            Self::AuthRejected => "Verify the API key has Reports read-only scope",
            Self::QuotaExceeded => {
                "Another client may be sharing the organization quota; lower --quota-requests"
            }
            Self::WindowRejected(_) => {
                "The window is too large for one query; it will be subdivided"
            }
            Self::UnexpectedStatus(_) => "The reporting API may be degraded; re-run the hour later",
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts, `None` when unbounded
    pub max_attempts: Option<u32>,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Pause before the next attempt
    pub backoff_duration: Duration,
    /// Window being fetched
    pub window: TimeWindow,
    /// Offset of the page being fetched
    pub offset: usize,
}

impl RetryContext {
    /// Convenience constructor used throughout the retry logic.
    pub fn new(
        attempt: u32,
        max_attempts: Option<u32>,
        error_type: RetryErrorType,
        backoff_duration: Duration,
        window: TimeWindow,
        offset: usize,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type,
            backoff_duration,
            window,
            offset,
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}) after {} - waiting {:.1} seconds... ({}, offset {})",
            self.attempt_label(),
            self.error_type.description(),
            self.backoff_duration.as_secs_f64(),
            self.window,
            self.offset
        )
    }

    /// Format final failure summary with actionable suggestion.
    pub fn format_failure(&self) -> String {
        format!(
            "[FAILED] Giving up on {} at offset {} after {} attempt(s): {}. {}",
            self.window,
            self.offset,
            self.attempt,
            self.error_type.description(),
            self.error_type.suggestion()
        )
    }

    fn attempt_label(&self) -> String {
        match self.max_attempts {
            Some(max) => format!("{}/{}", self.attempt, max),
            None => format!("{}", self.attempt),
        }
    }
}
