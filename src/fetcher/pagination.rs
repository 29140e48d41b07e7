//! Window paginator
//!
//! Pages through one time window of the activity endpoint, absorbing every
//! recoverable failure along the way:
//!
//! - connection failures are retried with exponential backoff
//! - HTTP 403 triggers a token renewal (the renewed token is handed back)
//! - HTTP 429 pauses for a fixed interval and repeats the same page
//! - HTTP 400/404 and the offset ceiling ask the caller to subdivide
//!
//! Anything else abandons the window, but the events already collected are
//! always returned alongside the terminal [`WindowStatus`].

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, error, info, warn};

use super::retry_formatter::RetryContext;
use super::{ActivityApi, BearerToken, PageQuery, PageResponse, RetryErrorType, TokenAuthority};
use crate::downloader::config::{connect_backoff, EngineConfig};
use crate::downloader::rate_limit::QuotaGovernor;
use crate::metrics;
use crate::shutdown::{sleep_unless_shutdown, SharedShutdown};
use crate::window::TimeWindow;
use crate::ActivityEvent;

/// Why a window has to be re-fetched at finer granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdivisionReason {
    /// The next page would start at or past the offset ceiling
    OffsetCeiling {
        /// Ceiling in force for the window
        ceiling: usize,
    },
    /// The API refused the window with HTTP 400 or 404
    WindowRejected {
        /// HTTP status code
        status: u16,
    },
}

impl SubdivisionReason {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::OffsetCeiling { .. } => "offset_ceiling",
            Self::WindowRejected { .. } => "window_rejected",
        }
    }
}

impl fmt::Display for SubdivisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OffsetCeiling { ceiling } => write!(f, "offset ceiling {ceiling} reached"),
            Self::WindowRejected { status } => write!(f, "window rejected with HTTP {status}"),
        }
    }
}

/// Why a window was abandoned
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbortReason {
    /// Every connection attempt for one page failed
    #[error("no response after {attempts} connection attempts: {last_error}")]
    ConnectionFailures {
        /// Attempts made
        attempts: u32,
        /// Last transport error
        last_error: String,
    },

    /// A failure that resending cannot fix
    #[error("request failed: {0}")]
    Transport(String),

    /// HTTP 200 with a body that is not an activity page
    #[error("malformed response body: {0}")]
    MalformedBody(String),

    /// Too many consecutive HTTP 403 responses
    #[error("token rejected {consecutive} times in a row")]
    AuthRejected {
        /// Consecutive 403 responses
        consecutive: u32,
    },

    /// Configured cap on HTTP 429 retries reached
    #[error("quota rejected {attempts} times in a row")]
    QuotaRetriesExhausted {
        /// Consecutive 429 responses
        attempts: u32,
    },

    /// A status the engine has no recovery for
    #[error("unexpected HTTP status {status}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
    },

    /// Shutdown requested
    #[error("cancelled")]
    Cancelled,
}

impl AbortReason {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::ConnectionFailures { .. } => "connection_failures",
            Self::Transport(_) => "transport",
            Self::MalformedBody(_) => "malformed_body",
            Self::AuthRejected { .. } => "auth_rejected",
            Self::QuotaRetriesExhausted { .. } => "quota_retries_exhausted",
            Self::UnexpectedStatus { .. } => "unexpected_status",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Terminal state of a window fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowStatus {
    /// The API ran out of events for the window
    Exhausted,
    /// The window holds more than one query can reach
    NeedsSubdivision(SubdivisionReason),
    /// The window was abandoned; events collected so far are still returned
    Aborted(AbortReason),
}

/// Result of paging through one window
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Window that was fetched
    pub window: TimeWindow,
    /// Events in the order the API returned them
    pub events: Vec<ActivityEvent>,
    /// How the fetch ended
    pub status: WindowStatus,
    /// Offset the next page would have used
    pub offset: usize,
    /// Successful pages received
    pub pages: usize,
}

impl FetchOutcome {
    /// Whether the caller should re-fetch the window at finer granularity
    pub fn needs_subdivision(&self) -> bool {
        matches!(self.status, WindowStatus::NeedsSubdivision(_))
    }

    /// Whether every event of the window was retrieved
    pub fn is_complete(&self) -> bool {
        self.status == WindowStatus::Exhausted
    }
}

/// Body of a successful activity response
#[derive(Debug, Deserialize)]
struct ActivityPage {
    #[serde(default)]
    data: Option<Vec<Value>>,
}

/// Parse a page body into its raw entries. A missing or null `data` is an empty page.
fn parse_page(body: &str) -> Result<Vec<Value>, String> {
    let page: ActivityPage = serde_json::from_str(body).map_err(|e| e.to_string())?;
    Ok(page.data.unwrap_or_default())
}

/// Sequential paginator bound to one API, token authority and quota governor
pub struct WindowPaginator<A, T> {
    api: A,
    authority: T,
    governor: QuotaGovernor,
    config: EngineConfig,
    shutdown: Option<SharedShutdown>,
}

impl<A: ActivityApi, T: TokenAuthority> WindowPaginator<A, T> {
    /// Create a paginator. The governor should be the only one issuing
    /// requests against the organization's quota.
    pub fn new(api: A, authority: T, governor: QuotaGovernor, config: EngineConfig) -> Self {
        Self {
            api,
            authority,
            governor,
            config,
            shutdown: None,
        }
    }

    /// Abort waits and pending windows once `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Quota governor
    pub fn governor(&self) -> &QuotaGovernor {
        &self.governor
    }

    /// Whether shutdown has been requested
    pub fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested())
    }

    /// Retrieve every event of `window`, paging by offset.
    ///
    /// # Arguments
    /// * `window` - Inclusive window to fetch
    /// * `offset_ceiling` - Offset at which the window is declared too large;
    ///   `None` pages until the API runs dry
    /// * `token` - Current bearer token
    ///
    /// # Returns
    /// The outcome together with the token to use from now on, which differs
    /// from `token` when a renewal happened.
    pub async fn fetch_window(
        &mut self,
        window: TimeWindow,
        offset_ceiling: Option<usize>,
        mut token: BearerToken,
    ) -> (FetchOutcome, BearerToken) {
        let limit = self.config.page_limit;
        let mut offset = 0usize;
        let mut pages = 0usize;
        let mut events = Vec::new();
        let mut consecutive_auth_failures = 0u32;
        let mut quota_rejections = 0u32;

        debug!(endpoint = self.api.endpoint(), %window, ?offset_ceiling, "Fetching window");

        let status = loop {
            if let Some(ceiling) = offset_ceiling {
                if offset >= ceiling {
                    warn!(
                        %window,
                        offset,
                        ceiling,
                        "Offset ceiling reached, window needs subdivision"
                    );
                    break WindowStatus::NeedsSubdivision(SubdivisionReason::OffsetCeiling {
                        ceiling,
                    });
                }
            }

            if !self.admit().await {
                break WindowStatus::Aborted(AbortReason::Cancelled);
            }

            let query = PageQuery {
                window,
                limit,
                offset,
            };
            let response = match self.send_with_retry(&query, &token).await {
                Ok(response) => response,
                Err(reason) => break WindowStatus::Aborted(reason),
            };
            metrics::record_request(response.status);

            match response.status {
                200 => {
                    consecutive_auth_failures = 0;
                    quota_rejections = 0;

                    let batch = match parse_page(&response.body) {
                        Ok(batch) => batch,
                        Err(e) => {
                            error!(
                                %window,
                                offset,
                                body = response.body_excerpt(),
                                "Unparseable activity page: {}",
                                e
                            );
                            break WindowStatus::Aborted(AbortReason::MalformedBody(e));
                        }
                    };
                    if batch.is_empty() {
                        break WindowStatus::Exhausted;
                    }

                    let batch_len = batch.len();
                    events.extend(batch.into_iter().map(ActivityEvent::from_value));

                    offset += batch_len;
                    pages += 1;
                    debug!(
                        %window,
                        batch = batch_len,
                        total = events.len(),
                        offset,
                        "Page received"
                    );

                    if batch_len < limit {
                        break WindowStatus::Exhausted;
                    }
                }
                403 => {
                    consecutive_auth_failures += 1;
                    warn!(
                        %window,
                        offset,
                        consecutive = consecutive_auth_failures,
                        "Token rejected (403), renewing"
                    );
                    match self.authority.acquire().await {
                        Ok(fresh) => {
                            metrics::record_token_refresh(true);
                            info!("Bearer token renewed");
                            token = fresh;
                        }
                        Err(e) => {
                            metrics::record_token_refresh(false);
                            let pause = self.config.retry.auth_retry_pause;
                            warn!(
                                "Token renewal failed: {} - waiting {:.1} seconds",
                                e,
                                pause.as_secs_f64()
                            );
                            if !self.pause(pause).await {
                                break WindowStatus::Aborted(AbortReason::Cancelled);
                            }
                        }
                    }
                    if consecutive_auth_failures >= self.config.retry.max_consecutive_auth_failures
                    {
                        error!(
                            %window,
                            consecutive = consecutive_auth_failures,
                            "{}",
                            RetryErrorType::AuthRejected.suggestion()
                        );
                        break WindowStatus::Aborted(AbortReason::AuthRejected {
                            consecutive: consecutive_auth_failures,
                        });
                    }
                }
                429 => {
                    quota_rejections += 1;
                    metrics::record_quota_rejection();
                    let cap = self.config.retry.max_quota_retries;
                    if cap.is_some_and(|max| quota_rejections > max) {
                        error!(
                            %window,
                            offset,
                            attempts = quota_rejections,
                            "Giving up after repeated 429 responses"
                        );
                        break WindowStatus::Aborted(AbortReason::QuotaRetriesExhausted {
                            attempts: quota_rejections,
                        });
                    }
                    let pause = self.config.retry.quota_rejection_pause;
                    let context = RetryContext::new(
                        quota_rejections,
                        cap.map(|max| max + 1),
                        RetryErrorType::QuotaExceeded,
                        pause,
                        window,
                        offset,
                    );
                    warn!("{}", context.format_retry());
                    if !self.pause(pause).await {
                        break WindowStatus::Aborted(AbortReason::Cancelled);
                    }
                }
                400 | 404 => {
                    warn!(
                        %window,
                        offset,
                        status = response.status,
                        body = response.body_excerpt(),
                        "Window rejected by the API"
                    );
                    break WindowStatus::NeedsSubdivision(SubdivisionReason::WindowRejected {
                        status: response.status,
                    });
                }
                status => {
                    error!(
                        %window,
                        offset,
                        status,
                        body = response.body_excerpt(),
                        "Unexpected status: {}",
                        RetryErrorType::from_status(status).suggestion()
                    );
                    break WindowStatus::Aborted(AbortReason::UnexpectedStatus { status });
                }
            }
        };

        match &status {
            WindowStatus::Exhausted => {}
            WindowStatus::NeedsSubdivision(reason) => metrics::record_subdivision(reason.label()),
            WindowStatus::Aborted(reason) => {
                metrics::record_window_aborted(reason.label());
                warn!(
                    %window,
                    kept = events.len(),
                    "Window abandoned: {}",
                    reason
                );
            }
        }
        metrics::record_events(events.len());

        let outcome = FetchOutcome {
            window,
            events,
            status,
            offset,
            pages,
        };
        (outcome, token)
    }

    /// Take one quota slot. Returns `false` if shutdown fired first.
    async fn admit(&mut self) -> bool {
        match self.shutdown.clone() {
            None => {
                self.governor.check().await;
                true
            }
            Some(shutdown) => {
                if shutdown.is_shutdown_requested() {
                    return false;
                }
                tokio::select! {
                    _ = self.governor.check() => true,
                    _ = shutdown.wait_for_shutdown() => false,
                }
            }
        }
    }

    async fn pause(&self, duration: std::time::Duration) -> bool {
        sleep_unless_shutdown(duration, self.shutdown.as_deref()).await
    }

    /// Send one page request, retrying transient failures.
    async fn send_with_retry(
        &self,
        query: &PageQuery,
        token: &BearerToken,
    ) -> Result<PageResponse, AbortReason> {
        let max_attempts = self.config.retry.max_connect_attempts;
        let mut attempt = 0u32;

        loop {
            let err = match self.api.fetch_page(query, token).await {
                Ok(response) => {
                    if attempt > 0 {
                        info!(
                            window = %query.window,
                            offset = query.offset,
                            "Request succeeded after {} failed attempt(s)",
                            attempt
                        );
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };
            attempt += 1;

            if !err.is_transient() {
                let context = RetryContext::new(
                    attempt,
                    Some(max_attempts),
                    err.kind,
                    std::time::Duration::ZERO,
                    query.window,
                    query.offset,
                );
                error!("{} ({})", context.format_failure(), err.message);
                return Err(AbortReason::Transport(err.to_string()));
            }

            metrics::record_transient_failure();
            let backoff = connect_backoff(attempt - 1);
            let context = RetryContext::new(
                attempt,
                Some(max_attempts),
                err.kind,
                backoff,
                query.window,
                query.offset,
            );

            if attempt >= max_attempts {
                error!("{} ({})", context.format_failure(), err.message);
                return Err(AbortReason::ConnectionFailures {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }

            warn!("{} ({})", context.format_retry(), err.message);
            if !self.pause(backoff).await {
                return Err(AbortReason::Cancelled);
            }
        }
    }
}
