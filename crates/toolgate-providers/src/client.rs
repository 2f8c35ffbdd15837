//! Authenticated REST client for one API family.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use toolgate_core::ApiFamily;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::AccessGrant;

/// Header LinkedIn requires on v2 REST calls.
const RESTLI_HEADER: &str = "X-Restli-Protocol-Version";
const RESTLI_VERSION: &str = "2.0.0";

/// A failure reported by an upstream API call.
///
/// Tool operations return this; the invocation wrapper classifies it.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The response body did not match the expected shape.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// Any other failure raised by the tool operation itself.
    #[error("{0}")]
    Message(String),
}

impl UpstreamError {
    /// Creates a free-form failure.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Returns the HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// An API client bound to a validated access grant.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    family: ApiFamily,
    base_url: String,
    grant: AccessGrant,
}

impl ApiClient {
    /// Creates a client for `family` using its public base URL.
    pub fn new(family: ApiFamily, grant: AccessGrant, timeout: Duration) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {}", e))
                    .with_provider(family.provider().as_str())
                    .with_source(e)
            })?;
        Ok(Self {
            http,
            family,
            base_url: family.base_url().to_string(),
            grant,
        })
    }

    /// Points the client at another base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the API family.
    pub fn family(&self) -> ApiFamily {
        self.family
    }

    /// Returns the grant this client authenticates with.
    pub fn grant(&self) -> &AccessGrant {
        &self.grant
    }

    /// Returns the Facebook page ID bound to the grant.
    pub fn page_id(&self) -> Option<&str> {
        self.grant.page_id.as_deref()
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins `path` onto the base URL. Absolute URLs, such as paging links,
    /// are accepted only on the base URL's origin.
    fn url(&self, path: &str) -> Result<String, UpstreamError> {
        if !(path.starts_with("http://") || path.starts_with("https://")) {
            return Ok(format!("{}/{}", self.base_url, path.trim_start_matches('/')));
        }
        match (origin(path), origin(&self.base_url)) {
            (Some(target), Some(base)) if target.eq_ignore_ascii_case(base) => Ok(path.to_string()),
            (target, _) => Err(UpstreamError::message(format!(
                "refusing to send {} credentials to {}",
                self.family,
                target.unwrap_or(path)
            ))),
        }
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, UpstreamError> {
        let url = self.url(path)?;
        debug!(family = %self.family, %method, %url, "upstream request");
        let builder = self
            .http
            .request(method, url)
            .bearer_auth(&self.grant.access_token);
        if self.family == ApiFamily::LinkedIn {
            Ok(builder.header(RESTLI_HEADER, RESTLI_VERSION))
        } else {
            Ok(builder)
        }
    }

    /// Sends a GET request and decodes the JSON response.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let response = self
            .request(reqwest::Method::GET, path)?
            .query(query)
            .send()
            .await
            .map_err(UpstreamError::Transport)?;
        decode(response).await
    }

    /// Sends a JSON body with POST and decodes the JSON response.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, UpstreamError> {
        let response = self
            .request(reqwest::Method::POST, path)?
            .json(body)
            .send()
            .await
            .map_err(UpstreamError::Transport)?;
        decode(response).await
    }

    /// Sends a DELETE request.
    pub async fn delete(&self, path: &str) -> Result<(), UpstreamError> {
        let response = self
            .request(reqwest::Method::DELETE, path)?
            .send()
            .await
            .map_err(UpstreamError::Transport)?;
        checked(response).await.map(|_| ())
    }
}

/// Returns the `scheme://authority` prefix of an absolute URL.
fn origin(url: &str) -> Option<&str> {
    let (scheme, rest) = url.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Some(&url[..scheme.len() + 3 + end])
}

async fn checked(response: reqwest::Response) -> Result<String, UpstreamError> {
    let status = response.status();
    let body = response.text().await.map_err(UpstreamError::Transport)?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, UpstreamError> {
    let body = checked(response).await?;
    // Some endpoints answer 204 to mutations.
    let body = if body.trim().is_empty() { "null" } else { body.as_str() };
    serde_json::from_str(body).map_err(|e| UpstreamError::Decode(e.to_string()))
}
