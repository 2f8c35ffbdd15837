//! OAuth2 token endpoint client.
//!
//! [`TokenEndpoint`] is the seam between the credential layer and the
//! network. [`HttpTokenEndpoint`] talks to the real providers; tests plug in
//! an in-memory endpoint that counts exchanges.
//!
//! Grants used:
//!
//! - Google: `refresh_token` grant during tool calls, `authorization_code`
//!   grant (with PKCE verifier) during consent
//! - LinkedIn: `authorization_code` grant during consent, `refresh_token`
//!   grant only for applications that were issued one
//! - Facebook: code exchange, upgrade to a long-lived user token, then page
//!   token derivation through `/me/accounts`

use std::time::Duration;

use serde::Deserialize;
use toolgate_core::ProviderId;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;
use crate::store::AppKeys;
use crate::tokens::TokenResponse;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const LINKEDIN_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const FACEBOOK_GRAPH_URL: &str = "https://graph.facebook.com/v19.0";

/// A Facebook page and its page-scoped access token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageToken {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub access_token: String,
}

/// Performs OAuth2 grants against a provider's token endpoint.
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges a refresh token for a new access token.
    fn refresh(
        &self,
        provider: ProviderId,
        keys: AppKeys,
        refresh_token: String,
    ) -> BoxFuture<'_, ProviderResult<TokenResponse>>;

    /// Exchanges an authorization code obtained during consent.
    fn exchange_code(
        &self,
        provider: ProviderId,
        keys: AppKeys,
        code: String,
        redirect_uri: String,
        verifier: Option<String>,
    ) -> BoxFuture<'_, ProviderResult<TokenResponse>>;

    /// Lists the Facebook pages a user token can manage.
    fn page_tokens(&self, user_token: String) -> BoxFuture<'_, ProviderResult<Vec<PageToken>>>;
}

/// Token endpoint URLs, overridable for tests and proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrls {
    pub google_token: String,
    pub linkedin_token: String,
    pub facebook_graph: String,
}

impl Default for EndpointUrls {
    fn default() -> Self {
        Self {
            google_token: GOOGLE_TOKEN_URL.to_string(),
            linkedin_token: LINKEDIN_TOKEN_URL.to_string(),
            facebook_graph: FACEBOOK_GRAPH_URL.to_string(),
        }
    }
}

/// [`TokenEndpoint`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    http_client: reqwest::Client,
    urls: EndpointUrls,
}

impl HttpTokenEndpoint {
    /// Creates an endpoint talking to the real providers.
    pub fn new(timeout: Duration) -> ProviderResult<Self> {
        Self::with_urls(timeout, EndpointUrls::default())
    }

    /// Creates an endpoint with custom URLs.
    pub fn with_urls(timeout: Duration, urls: EndpointUrls) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;
        Ok(Self { http_client, urls })
    }

    fn token_url(&self, provider: ProviderId) -> String {
        match provider {
            ProviderId::Google => self.urls.google_token.clone(),
            ProviderId::LinkedIn => self.urls.linkedin_token.clone(),
            ProviderId::Facebook => format!("{}/oauth/access_token", self.urls.facebook_graph),
        }
    }

    async fn post_form(
        &self,
        provider: ProviderId,
        url: &str,
        params: &[(&str, &str)],
        what: &str,
    ) -> ProviderResult<TokenResponse> {
        let response = self
            .http_client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| request_error(provider, what, e))?;
        read_token_response(provider, response, what).await
    }

    async fn get_query(
        &self,
        provider: ProviderId,
        url: &str,
        params: &[(&str, &str)],
        what: &str,
    ) -> ProviderResult<TokenResponse> {
        let response = self
            .http_client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| request_error(provider, what, e))?;
        read_token_response(provider, response, what).await
    }

    async fn refresh_impl(
        &self,
        provider: ProviderId,
        keys: AppKeys,
        refresh_token: String,
    ) -> ProviderResult<TokenResponse> {
        if provider == ProviderId::Facebook {
            return Err(ProviderError::configuration(
                "Facebook page tokens are not refreshed; re-run consent instead",
            )
            .with_provider(provider.as_str()));
        }

        let params = [
            ("client_id", keys.client_id.as_str()),
            ("client_secret", keys.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        debug!(provider = %provider, "requesting token refresh");
        let response = self
            .post_form(provider, &self.token_url(provider), &params, "token refresh")
            .await?;
        info!(provider = %provider, "access token refreshed");
        Ok(response)
    }

    async fn exchange_code_impl(
        &self,
        provider: ProviderId,
        keys: AppKeys,
        code: String,
        redirect_uri: String,
        verifier: Option<String>,
    ) -> ProviderResult<TokenResponse> {
        let url = self.token_url(provider);
        let mut params = vec![
            ("client_id", keys.client_id.as_str()),
            ("client_secret", keys.client_secret.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ];

        let response = match provider {
            ProviderId::Google | ProviderId::LinkedIn => {
                params.push(("grant_type", "authorization_code"));
                if let Some(ref verifier) = verifier {
                    params.push(("code_verifier", verifier.as_str()));
                }
                self.post_form(provider, &url, &params, "code exchange")
                    .await?
            }
            ProviderId::Facebook => {
                let short = self
                    .get_query(provider, &url, &params, "code exchange")
                    .await?;
                let upgrade = [
                    ("grant_type", "fb_exchange_token"),
                    ("client_id", keys.client_id.as_str()),
                    ("client_secret", keys.client_secret.as_str()),
                    ("fb_exchange_token", short.access_token.as_str()),
                ];
                match self
                    .get_query(provider, &url, &upgrade, "long-lived token exchange")
                    .await
                {
                    Ok(long) => long,
                    Err(e) => {
                        warn!(error = %e, "long-lived token exchange failed, keeping short-lived token");
                        short
                    }
                }
            }
        };

        info!(provider = %provider, "authorization code exchanged");
        Ok(response)
    }

    async fn page_tokens_impl(&self, user_token: String) -> ProviderResult<Vec<PageToken>> {
        #[derive(Deserialize)]
        struct Accounts {
            #[serde(default)]
            data: Vec<PageToken>,
        }

        let provider = ProviderId::Facebook;
        let url = format!("{}/me/accounts", self.urls.facebook_graph);
        let response = self
            .http_client
            .get(&url)
            .query(&[("access_token", user_token.as_str())])
            .send()
            .await
            .map_err(|e| request_error(provider, "page listing", e))?;

        let body = checked_body(provider, response, "page listing").await?;
        let accounts: Accounts = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid /me/accounts response: {}", e))
                .with_provider(provider.as_str())
        })?;
        debug!(count = accounts.data.len(), "listed Facebook pages");
        Ok(accounts.data)
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn refresh(
        &self,
        provider: ProviderId,
        keys: AppKeys,
        refresh_token: String,
    ) -> BoxFuture<'_, ProviderResult<TokenResponse>> {
        Box::pin(self.refresh_impl(provider, keys, refresh_token))
    }

    fn exchange_code(
        &self,
        provider: ProviderId,
        keys: AppKeys,
        code: String,
        redirect_uri: String,
        verifier: Option<String>,
    ) -> BoxFuture<'_, ProviderResult<TokenResponse>> {
        Box::pin(self.exchange_code_impl(provider, keys, code, redirect_uri, verifier))
    }

    fn page_tokens(&self, user_token: String) -> BoxFuture<'_, ProviderResult<Vec<PageToken>>> {
        Box::pin(self.page_tokens_impl(user_token))
    }
}

fn request_error(provider: ProviderId, what: &str, e: reqwest::Error) -> ProviderError {
    ProviderError::network(format!("{} request failed: {}", what, e))
        .with_provider(provider.as_str())
        .with_source(e)
}

async fn read_token_response(
    provider: ProviderId,
    response: reqwest::Response,
    what: &str,
) -> ProviderResult<TokenResponse> {
    let body = checked_body(provider, response, what).await?;
    serde_json::from_str(&body).map_err(|e| {
        ProviderError::invalid_response(format!("invalid token response: {}", e))
            .with_provider(provider.as_str())
    })
}

/// Reads the body, turning non-success statuses into classified errors.
async fn checked_body(
    provider: ProviderId,
    response: reqwest::Response,
    what: &str,
) -> ProviderResult<String> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        ProviderError::network(format!("failed to read response: {}", e))
            .with_provider(provider.as_str())
    })?;

    if status.is_success() {
        return Ok(body);
    }

    let reason = oauth_error_reason(&body).unwrap_or_else(|| body.clone());
    let message = format!("{} failed ({}): {}", what, status.as_u16(), reason);
    let err = if status.as_u16() == 429 {
        ProviderError::rate_limited(message)
    } else if status.is_server_error() {
        ProviderError::network(message)
    } else {
        ProviderError::authentication(message)
    };
    Err(err.with_provider(provider.as_str()))
}

/// Extracts `error: error_description` from an OAuth2 or Graph API error body.
fn oauth_error_reason(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        serde_json::Value::String(code) => {
            let description = value
                .get("error_description")
                .and_then(|d| d.as_str())
                .unwrap_or_default();
            if description.is_empty() {
                Some(code.clone())
            } else {
                Some(format!("{}: {}", code, description))
            }
        }
        serde_json::Value::Object(graph) => graph
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    }
}
