//! # Umbrella Activity Downloader Library
//!
//! Retrieves security-event activity logs from a rate-limited, offset-paginated
//! reporting API across an arbitrary historical span, without silently dropping
//! events when the API's pagination or query limits are exceeded.
//!
//! ## Features
//!
//! - **Offset-ceiling aware pagination**: windows that cannot be paged through
//!   are automatically re-fetched minute by minute
//! - **Quota governor**: blocks before exceeding the organization-wide request quota
//! - **Self-healing requests**: connection retries with backoff, token renewal on
//!   HTTP 403 and fixed back-off on HTTP 429
//! - **Append-only CSV output**: one summary row per event plus the raw payload
//!
//! ## Quick Start
//!
//! ```no_run
//! use umbrella_activity_downloader::downloader::{EngineConfig, QuotaGovernor};
//! use umbrella_activity_downloader::fetcher::auth::{ClientCredentials, OAuthTokenAuthority};
//! use umbrella_activity_downloader::fetcher::activity_http::UmbrellaHttpClient;
//! use umbrella_activity_downloader::fetcher::pagination::WindowPaginator;
//! use umbrella_activity_downloader::fetcher::TokenAuthority;
//! use umbrella_activity_downloader::identity::OrganizationId;
//! use chrono::{TimeZone, Utc};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = ClientCredentials::new("client-id", "client-secret");
//! let authority = OAuthTokenAuthority::new(credentials)?;
//! let token = authority.acquire().await?;
//! let org_id = OrganizationId::from_token(&token)?;
//!
//! let api = UmbrellaHttpClient::new(org_id)?;
//! let config = EngineConfig::default();
//! let governor = QuotaGovernor::new(config.quota_requests, config.quota_period);
//! let mut paginator = WindowPaginator::new(api, authority, governor, config);
//!
//! let hour = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let (report, _token) = paginator.fetch_hour(hour, token).await;
//! println!("{} events", report.events.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`window`] - Time windows aligned to clock hours and minutes
//! - [`identity`] - Organization discovery from the bearer token
//! - [`fetcher`] - API transport, token authority and the window paginator
//! - [`downloader`] - Quota governor, hour orchestration and the report driver
//! - [`output`] - Event sinks (CSV)
//! - [`shutdown`] - Cancellation hook shared by long-running sleeps

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// CLI command implementations
pub mod cli;

/// Report orchestration, quota governor and engine configuration
pub mod downloader;

/// API transport, token authority and pagination
pub mod fetcher;

/// Organization discovery from bearer tokens
pub mod identity;

/// Production observability metrics
pub mod metrics;

/// Event sinks
pub mod output;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Time windows
pub mod window;

pub use identity::OrganizationId;
pub use window::TimeWindow;

/// A single activity event as returned by the reporting API.
///
/// The API schema is loose and varies by event type, so the entry is kept
/// verbatim and the handful of fields used by the CSV summary are exposed
/// through typed accessors. Entries that are not JSON objects are kept too;
/// their accessors all return `None`. Serializing an event yields the raw
/// value unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEvent {
    raw: Value,
}

/// Category attached to an event (only the label is surfaced)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    /// Human-readable category label
    pub label: String,
}

impl ActivityEvent {
    /// Wrap one entry of a page's `data` array
    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    /// Borrow the raw payload
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Top-level fields, when the entry is a JSON object
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.raw.as_object()
    }

    /// Raw value of a top-level field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields().and_then(|fields| fields.get(name))
    }

    /// Top-level field rendered as text (strings, numbers and booleans only)
    pub fn text(&self, name: &str) -> Option<String> {
        self.field(name).and_then(scalar_text)
    }

    /// `timestamp` field as text
    pub fn timestamp(&self) -> Option<String> {
        self.text("timestamp")
    }

    /// `eventTime` field as text
    pub fn event_time(&self) -> Option<String> {
        self.text("eventTime")
    }

    /// `identity.label`
    pub fn identity_label(&self) -> Option<String> {
        self.field("identity")
            .and_then(|identity| identity.get("label"))
            .and_then(scalar_text)
    }

    /// `internalIp`
    pub fn internal_ip(&self) -> Option<String> {
        self.text("internalIp")
    }

    /// `externalIp`
    pub fn external_ip(&self) -> Option<String> {
        self.text("externalIp")
    }

    /// `destination`
    pub fn destination(&self) -> Option<String> {
        self.text("destination")
    }

    /// `action`
    pub fn action(&self) -> Option<String> {
        self.text("action")
    }

    /// `eventType`
    pub fn event_type(&self) -> Option<String> {
        self.text("eventType")
    }

    /// `protocol`
    pub fn protocol(&self) -> Option<String> {
        self.text("protocol")
    }

    /// `queryType`
    pub fn query_type(&self) -> Option<String> {
        self.text("queryType")
    }

    /// `responseCode`
    pub fn response_code(&self) -> Option<String> {
        self.text("responseCode")
    }

    /// `url`
    pub fn url(&self) -> Option<String> {
        self.text("url")
    }

    /// Categories attached to the event; entries without a label get an empty one
    pub fn categories(&self) -> Vec<Category> {
        let Some(Value::Array(items)) = self.field("categories") else {
            return Vec::new();
        };

        items
            .iter()
            .map(|item| Category {
                label: item.get("label").and_then(scalar_text).unwrap_or_default(),
            })
            .collect()
    }

    /// Compact JSON rendering of the raw payload
    pub fn to_json(&self) -> String {
        self.raw.to_string()
    }
}

impl Serialize for ActivityEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
