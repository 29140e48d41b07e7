//! OAuth2 client-credentials token authority
//!
//! Exchanges an API key/secret pair for a bearer token at the management
//! API's token endpoint. Tokens carry an undisclosed expiry; callers renew
//! only when the reporting API answers HTTP 403.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{AuthError, BearerToken, TokenAuthority};

/// Default OAuth2 token endpoint of the management API
pub const DEFAULT_TOKEN_URL: &str = "https://management.api.umbrella.com/auth/v2/oauth2/token";

/// Timeout for a single token request
const TOKEN_REQUEST_TIMEOUT_SECS: u64 = 30;

/// API key and secret
#[derive(Clone)]
pub struct ClientCredentials {
    client_id: String,
    client_secret: SecretString,
}

impl ClientCredentials {
    /// Create credentials
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
        }
    }

    /// API key
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Token authority backed by the OAuth2 client-credentials grant
pub struct OAuthTokenAuthority {
    client: Client,
    token_url: String,
    credentials: ClientCredentials,
}

impl OAuthTokenAuthority {
    /// Create an authority against the default token endpoint
    pub fn new(credentials: ClientCredentials) -> Result<Self, AuthError> {
        Self::with_token_url(credentials, DEFAULT_TOKEN_URL)
    }

    /// Create an authority against a custom token endpoint
    pub fn with_token_url(
        credentials: ClientCredentials,
        token_url: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TOKEN_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AuthError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            token_url: token_url.into(),
            credentials,
        })
    }

    /// Token endpoint in use
    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

#[async_trait]
impl TokenAuthority for OAuthTokenAuthority {
    async fn acquire(&self) -> Result<BearerToken, AuthError> {
        debug!(
            client_id = %self.credentials.client_id,
            token_url = %self.token_url,
            "Requesting bearer token"
        );

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(self.credentials.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body: excerpt,
            });
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        match payload.access_token {
            Some(token) if !token.is_empty() => Ok(BearerToken::new(token)),
            _ => Err(AuthError::MalformedResponse(
                "response has no access_token".to_string(),
            )),
        }
    }
}
