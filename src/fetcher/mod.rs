//! API transport, token authority and pagination
//!
//! The retrieval engine talks to the outside world through two seams:
//!
//! - [`ActivityApi`] issues one page request and reports the raw HTTP outcome
//! - [`TokenAuthority`] mints a fresh bearer token on demand
//!
//! Production implementations live in [`activity_http`] and [`auth`]; tests
//! substitute in-memory fakes.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use crate::window::TimeWindow;

pub mod activity_http;
pub mod auth;
pub mod pagination;
pub mod retry_formatter;

pub use retry_formatter::RetryErrorType;

/// Short-lived credential sent on every API call.
///
/// Passed by value through the engine and handed back when renewed, so there
/// is never a shared mutable token cell.
#[derive(Clone)]
pub struct BearerToken(SecretString);

impl BearerToken {
    /// Wrap a raw token string
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Borrow the secret
    pub fn secret(&self) -> &SecretString {
        &self.0
    }

    /// `Authorization` header value
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.0.expose_secret())
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

/// One page request against a time window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    /// Window being paged through
    pub window: TimeWindow,
    /// Page size
    pub limit: usize,
    /// Zero-based offset into the window's result set
    pub offset: usize,
}

impl PageQuery {
    /// Query parameters in the order the activity endpoint documents them
    pub fn params(&self) -> [(&'static str, String); 4] {
        [
            ("from", self.window.start_ms().to_string()),
            ("to", self.window.end_ms().to_string()),
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
        ]
    }
}

/// Raw HTTP outcome of a page request; the body is parsed by the paginator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl PageResponse {
    /// Convenience constructor
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// First 200 characters of the body, for log messages
    pub fn body_excerpt(&self) -> &str {
        match self.body.char_indices().nth(200) {
            Some((idx, _)) => &self.body[..idx],
            None => &self.body,
        }
    }
}

/// Failure to obtain any HTTP response at all
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    /// Classified cause
    pub kind: RetryErrorType,
    /// Underlying error message
    pub message: String,
}

impl TransportError {
    /// Convenience constructor
    pub fn new(kind: RetryErrorType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether the request may succeed if simply sent again
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Token acquisition errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Credentials rejected by the token endpoint
    #[error("token request rejected with HTTP {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        body: String,
    },

    /// Network failure while requesting a token
    #[error("network error during token request: {0}")]
    Network(String),

    /// Token endpoint answered without a usable `access_token`
    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    /// Client could not be configured
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Page transport for the organization-scoped activity endpoint
#[async_trait]
pub trait ActivityApi: Send + Sync {
    /// Issue one GET for `query` authenticated with `token`
    ///
    /// # Returns
    /// The status and body of whatever response arrived, or a [`TransportError`]
    /// when no response could be read
    async fn fetch_page(
        &self,
        query: &PageQuery,
        token: &BearerToken,
    ) -> Result<PageResponse, TransportError>;

    /// Endpoint URL, for log messages
    fn endpoint(&self) -> &str;
}

/// Mints bearer tokens from stored client credentials
#[async_trait]
pub trait TokenAuthority: Send + Sync {
    /// Exchange the credentials for a fresh token
    async fn acquire(&self) -> Result<BearerToken, AuthError>;
}

#[async_trait]
impl<T: ActivityApi + ?Sized> ActivityApi for std::sync::Arc<T> {
    async fn fetch_page(
        &self,
        query: &PageQuery,
        token: &BearerToken,
    ) -> Result<PageResponse, TransportError> {
        (**self).fetch_page(query, token).await
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }
}

#[async_trait]
impl<T: TokenAuthority + ?Sized> TokenAuthority for std::sync::Arc<T> {
    async fn acquire(&self) -> Result<BearerToken, AuthError> {
        (**self).acquire().await
    }
}
