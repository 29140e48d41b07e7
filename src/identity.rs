//! Organization discovery from bearer tokens
//!
//! The management API issues JWTs whose `sub` claim has the form
//! `org/<organization id>/...`. The reporting endpoints are scoped by that
//! organization id, so it is read from the token instead of being asked for.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use secrecy::ExposeSecret;
use serde_json::Value;
use std::fmt;

use crate::fetcher::BearerToken;

/// Organization identifier scoping the reporting endpoints
///
/// # Examples
///
/// ```
/// use umbrella_activity_downloader::identity::OrganizationId;
///
/// let org = OrganizationId::parse("2345678").unwrap();
/// assert_eq!(org.as_str(), "2345678");
/// assert_eq!(OrganizationId::from_subject("org/2345678/user/42").unwrap(), org);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrganizationId(String);

impl OrganizationId {
    /// Validate an operator-supplied organization id
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::InvalidOrganization(
                "organization id cannot be empty".to_string(),
            ));
        }
        if trimmed.contains('/') || trimmed.chars().any(char::is_whitespace) {
            return Err(IdentityError::InvalidOrganization(format!(
                "organization id must not contain '/' or whitespace: {trimmed}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Extract the organization id from a JWT `sub` claim (`org/<id>/...`)
    pub fn from_subject(subject: &str) -> Result<Self, IdentityError> {
        let mut parts = subject.split('/');
        match (parts.next(), parts.next()) {
            (Some("org"), Some(id)) if !id.is_empty() => Ok(Self(id.to_string())),
            _ => Err(IdentityError::UnexpectedSubject(subject.to_string())),
        }
    }

    /// Decode the token payload and extract the organization id
    pub fn from_token(token: &BearerToken) -> Result<Self, IdentityError> {
        let claims = decode_jwt_payload(token.secret().expose_secret())?;
        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .ok_or(IdentityError::MissingSubject)?;
        Self::from_subject(subject)
    }

    /// Borrow the id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decode the (unverified) claims segment of a JWT
pub fn decode_jwt_payload(jwt: &str) -> Result<Value, IdentityError> {
    let segment = jwt
        .split('.')
        .nth(1)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IdentityError::MalformedToken("missing payload segment".to_string()))?;

    // Issuers disagree on padding; strip it and decode without.
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| IdentityError::MalformedToken(format!("invalid base64url payload: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| IdentityError::MalformedToken(format!("payload is not JSON: {e}")))
}

/// Organization discovery errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    /// Token is not a decodable JWT
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Token has no string `sub` claim
    #[error("token has no 'sub' claim")]
    MissingSubject,

    /// `sub` claim is not of the form `org/<id>/...`
    #[error("unexpected token subject format: {0}")]
    UnexpectedSubject(String),

    /// Operator-supplied organization id is invalid
    #[error("invalid organization id: {0}")]
    InvalidOrganization(String),
}
