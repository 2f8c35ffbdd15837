//! Token expiry model and token endpoint responses.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::PersistedCredentials;

/// Validity of a stored access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// Not yet inspected.
    Unknown,
    /// Present and expiring after `now + skew`.
    Valid,
    /// Missing, without expiry, or expired.
    NeedsRefresh,
    /// No refresh token, or the token endpoint rejected the exchange.
    RefreshFailed,
}

impl TokenState {
    /// Returns the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Valid => "valid",
            Self::NeedsRefresh => "needs_refresh",
            Self::RefreshFailed => "refresh_failed",
        }
    }
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assesses a stored record at `now`.
///
/// A token without a recorded expiry is never assumed valid.
pub fn assess(record: &PersistedCredentials, now: DateTime<Utc>, skew: Duration) -> TokenState {
    if record.access_token.is_none() {
        return TokenState::NeedsRefresh;
    }
    let Some(expiry) = record.expiry() else {
        return TokenState::NeedsRefresh;
    };
    let skew = chrono::Duration::from_std(skew).unwrap_or_else(|_| chrono::Duration::zero());
    if expiry > now + skew {
        TokenState::Valid
    } else {
        TokenState::NeedsRefresh
    }
}

/// Response body of an OAuth2 token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Creates a response carrying only an access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in: None,
            scope: None,
            token_type: None,
        }
    }

    /// Builder: set the lifetime in seconds.
    pub fn with_expires_in(mut self, secs: i64) -> Self {
        self.expires_in = Some(secs);
        self
    }

    /// Builder: set the refresh token.
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }
}

/// Merges a token response into `record`, stamping `expiry_date`.
///
/// The refresh token is only replaced when the endpoint returns a new one.
pub fn apply_token_response(
    record: &mut PersistedCredentials,
    response: &TokenResponse,
    now: DateTime<Utc>,
) {
    record.access_token = Some(response.access_token.clone());
    if let Some(ref refresh) = response.refresh_token {
        record.refresh_token = Some(refresh.clone());
    }
    record.expires_in = response.expires_in;
    record.expiry_date = response
        .expires_in
        .map(|secs| (now + chrono::Duration::seconds(secs)).timestamp_millis());
    if response.scope.is_some() {
        record.scope = response.scope.clone();
    }
    if response.token_type.is_some() {
        record.token_type = response.token_type.clone();
    }
}
