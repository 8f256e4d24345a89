//! Token endpoint contract: code exchange and refresh
//!
//! The lifecycle manager only ever sees the `ExchangeClient` trait, so the
//! vendor wire format stays at this boundary. `HttpExchangeClient` is the
//! production implementation: both operations POST form data to the
//! configured token endpoint with different grant types, authenticating
//! with HTTP basic credentials when a client secret is configured.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` values are deltas in seconds from the response time; the
/// caller anchors them to absolute timestamps when building a `TokenSet`.
/// Providers differ on refresh-token rotation, so both refresh fields are
/// optional — an omitted refresh token means "keep using the old one".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    /// Seconds until the refresh token expires, when the endpoint reports it
    #[serde(default)]
    pub refresh_token_expires_in: Option<u64>,
}

/// Abstraction over the token endpoint interactions.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn ExchangeClient>` in the manager).
pub trait ExchangeClient: Send + Sync {
    /// Exchange an authorization code for tokens (initial flow completion).
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenGrant>> + Send + 'a>>;

    /// Obtain a fresh access token using a refresh token.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenGrant>> + Send + 'a>>;
}

/// Endpoint configuration for the HTTP implementation.
///
/// `client_secret` is optional: public clients authenticate with the bare
/// `client_id` form field, confidential clients add HTTP basic auth.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
}

/// `ExchangeClient` implementation over reqwest.
pub struct HttpExchangeClient {
    client: reqwest::Client,
    endpoints: OAuthEndpoints,
}

impl HttpExchangeClient {
    pub fn new(client: reqwest::Client, endpoints: OAuthEndpoints) -> Self {
        Self { client, endpoints }
    }

    async fn post_grant(&self, form: &[(&str, &str)]) -> Result<TokenGrant> {
        let mut request = self.client.post(&self.endpoints.token_url).form(form);
        if let Some(secret) = &self.endpoints.client_secret {
            request = request.basic_auth(&self.endpoints.client_id, Some(secret));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(format!("token endpoint request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(classify_status(status.as_u16(), &body));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| Error::InvalidResponse(format!("unparseable grant: {e}")))
    }
}

impl ExchangeClient for HttpExchangeClient {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenGrant>> + Send + 'a>> {
        Box::pin(async move {
            self.post_grant(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.endpoints.client_id.as_str()),
                ("redirect_uri", self.endpoints.redirect_uri.as_str()),
            ])
            .await
        })
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenGrant>> + Send + 'a>> {
        Box::pin(async move {
            self.post_grant(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.endpoints.client_id.as_str()),
            ])
            .await
        })
    }
}

/// Map a non-2xx token endpoint status to the retry taxonomy.
///
/// 400/401/403 means the code or refresh token itself was rejected — the
/// grant is gone and retrying cannot bring it back. Everything else
/// (429, 5xx, odd intermediaries) is treated as transient.
fn classify_status(status: u16, body: &str) -> Error {
    match status {
        400 | 401 | 403 => Error::Rejected(format!("token endpoint returned {status}: {body}")),
        _ => Error::Http(format!("token endpoint returned {status}: {body}")),
    }
}
