//! Credential tuples and call-scoped overrides.

use std::fmt;

use serde::{Deserialize, Serialize};
use toolgate_core::{ProviderId, TokenFlow};

/// One logical credential field, shared by overrides and environment names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    ClientId,
    ClientSecret,
    RefreshToken,
    AccessToken,
    PageAccessToken,
    PageId,
}

impl CredentialField {
    /// All fields.
    pub const ALL: [CredentialField; 6] = [
        Self::ClientId,
        Self::ClientSecret,
        Self::RefreshToken,
        Self::AccessToken,
        Self::PageAccessToken,
        Self::PageId,
    ];

    /// Suffix of the environment variable, e.g. `CLIENT_ID`.
    pub fn env_suffix(&self) -> &'static str {
        match self {
            Self::ClientId => "CLIENT_ID",
            Self::ClientSecret => "CLIENT_SECRET",
            Self::RefreshToken => "REFRESH_TOKEN",
            Self::AccessToken => "ACCESS_TOKEN",
            Self::PageAccessToken => "PAGE_ACCESS_TOKEN",
            Self::PageId => "PAGE_ID",
        }
    }

    /// Fields a provider reads from overrides and the environment.
    pub fn for_provider(provider: ProviderId) -> &'static [CredentialField] {
        match provider {
            ProviderId::Google => &[Self::ClientId, Self::ClientSecret, Self::RefreshToken],
            ProviderId::LinkedIn => &[Self::ClientId, Self::ClientSecret, Self::AccessToken],
            ProviderId::Facebook => &[
                Self::ClientId,
                Self::ClientSecret,
                Self::PageAccessToken,
                Self::PageId,
            ],
        }
    }
}

/// Call-scoped credential overrides carried by a single tool invocation.
///
/// Accepts both `snake_case` and `camelCase` keys. Empty strings count as
/// absent.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallOverrides {
    #[serde(alias = "clientId", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(alias = "clientSecret", skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(alias = "refreshToken", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(alias = "accessToken", skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(alias = "pageAccessToken", skip_serializing_if = "Option::is_none")]
    pub page_access_token: Option<String>,
    #[serde(alias = "pageId", skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
}

impl CallOverrides {
    /// Creates empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the non-empty value of `field`, if any.
    pub fn get(&self, field: CredentialField) -> Option<&str> {
        let value = match field {
            CredentialField::ClientId => &self.client_id,
            CredentialField::ClientSecret => &self.client_secret,
            CredentialField::RefreshToken => &self.refresh_token,
            CredentialField::AccessToken => &self.access_token,
            CredentialField::PageAccessToken => &self.page_access_token,
            CredentialField::PageId => &self.page_id,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    /// Returns true if no field carries a value.
    pub fn is_empty(&self) -> bool {
        CredentialField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    /// Builder: set the client ID.
    pub fn with_client_id(mut self, value: impl Into<String>) -> Self {
        self.client_id = Some(value.into());
        self
    }

    /// Builder: set the client secret.
    pub fn with_client_secret(mut self, value: impl Into<String>) -> Self {
        self.client_secret = Some(value.into());
        self
    }

    /// Builder: set the refresh token.
    pub fn with_refresh_token(mut self, value: impl Into<String>) -> Self {
        self.refresh_token = Some(value.into());
        self
    }

    /// Builder: set the access token.
    pub fn with_access_token(mut self, value: impl Into<String>) -> Self {
        self.access_token = Some(value.into());
        self
    }

    /// Builder: set the page access token.
    pub fn with_page_access_token(mut self, value: impl Into<String>) -> Self {
        self.page_access_token = Some(value.into());
        self
    }

    /// Builder: set the page ID.
    pub fn with_page_id(mut self, value: impl Into<String>) -> Self {
        self.page_id = Some(value.into());
        self
    }
}

impl fmt::Debug for CallOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = CredentialField::ALL
            .iter()
            .filter(|field| self.get(**field).is_some())
            .map(|field| field.env_suffix())
            .collect();
        f.debug_struct("CallOverrides")
            .field("set", &fields)
            .finish()
    }
}

/// Where a credential tuple was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// At least one field came from call-scoped overrides.
    Override,
    /// Process environment only.
    Environment,
    /// Keys and credentials files in the config directory.
    Files,
}

impl CredentialSource {
    /// Returns the lowercase source name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Environment => "environment",
            Self::Files => "files",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identifiers and secrets needed to authenticate to one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialTuple {
    pub provider: ProviderId,
    pub source: CredentialSource,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub page_access_token: Option<String>,
    pub page_id: Option<String>,
}

impl CredentialTuple {
    /// Creates an empty tuple.
    pub fn new(provider: ProviderId, source: CredentialSource) -> Self {
        Self {
            provider,
            source,
            client_id: None,
            client_secret: None,
            refresh_token: None,
            access_token: None,
            page_access_token: None,
            page_id: None,
        }
    }

    /// Sets `field` to `value`.
    pub fn set(&mut self, field: CredentialField, value: Option<String>) {
        let slot = match field {
            CredentialField::ClientId => &mut self.client_id,
            CredentialField::ClientSecret => &mut self.client_secret,
            CredentialField::RefreshToken => &mut self.refresh_token,
            CredentialField::AccessToken => &mut self.access_token,
            CredentialField::PageAccessToken => &mut self.page_access_token,
            CredentialField::PageId => &mut self.page_id,
        };
        *slot = value.filter(|v| !v.trim().is_empty());
    }

    /// Returns true if the tuple has the application client ID and secret.
    pub fn has_app_keys(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Returns true if the tuple satisfies its provider's minimum field set.
    ///
    /// - Google: client ID, client secret and refresh token.
    /// - LinkedIn: an access token, or client ID and secret whose access
    ///   token lives in the credentials file.
    /// - Facebook: a page access token.
    pub fn is_usable(&self) -> bool {
        match self.provider {
            ProviderId::Google => self.has_app_keys() && self.refresh_token.is_some(),
            ProviderId::LinkedIn => self.access_token.is_some() || self.has_app_keys(),
            ProviderId::Facebook => self.page_access_token.is_some(),
        }
    }

    /// Returns the provider's token flow.
    pub fn token_flow(&self) -> TokenFlow {
        self.provider.token_flow()
    }
}

impl fmt::Debug for CredentialTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn present(value: &Option<String>) -> &'static str {
            if value.is_some() { "<set>" } else { "<unset>" }
        }
        f.debug_struct("CredentialTuple")
            .field("provider", &self.provider)
            .field("source", &self.source)
            .field("client_id", &self.client_id)
            .field("client_secret", &present(&self.client_secret))
            .field("refresh_token", &present(&self.refresh_token))
            .field("access_token", &present(&self.access_token))
            .field("page_access_token", &present(&self.page_access_token))
            .field("page_id", &self.page_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_accept_camel_case() {
        let json = r#"{"clientId": "id", "clientSecret": "secret", "refresh_token": "rt"}"#;
        let overrides: CallOverrides = serde_json::from_str(json).unwrap();
        assert_eq!(overrides.get(CredentialField::ClientId), Some("id"));
        assert_eq!(overrides.get(CredentialField::ClientSecret), Some("secret"));
        assert_eq!(overrides.get(CredentialField::RefreshToken), Some("rt"));
        assert!(!overrides.is_empty());
    }

    #[test]
    fn blank_overrides_are_empty() {
        let overrides = CallOverrides::new().with_access_token("  ");
        assert!(overrides.is_empty());
        assert_eq!(overrides.get(CredentialField::AccessToken), None);
    }

    #[test]
    fn debug_hides_secrets() {
        let overrides = CallOverrides::new().with_refresh_token("super-secret");
        let rendered = format!("{:?}", overrides);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REFRESH_TOKEN"));

        let mut tuple = CredentialTuple::new(ProviderId::Google, CredentialSource::Files);
        tuple.set(CredentialField::ClientSecret, Some("hidden".to_string()));
        let rendered = format!("{:?}", tuple);
        assert!(!rendered.contains("hidden"));
    }

    #[test]
    fn google_minimum_fields() {
        let mut tuple = CredentialTuple::new(ProviderId::Google, CredentialSource::Environment);
        tuple.set(CredentialField::ClientId, Some("abc".to_string()));
        assert!(!tuple.is_usable());
        tuple.set(CredentialField::ClientSecret, Some("def".to_string()));
        assert!(!tuple.is_usable());
        tuple.set(CredentialField::RefreshToken, Some("ghi".to_string()));
        assert!(tuple.is_usable());
    }

    #[test]
    fn linkedin_minimum_fields() {
        let mut tuple = CredentialTuple::new(ProviderId::LinkedIn, CredentialSource::Environment);
        assert!(!tuple.is_usable());
        tuple.set(CredentialField::AccessToken, Some("tok".to_string()));
        assert!(tuple.is_usable());
    }

    #[test]
    fn facebook_minimum_fields() {
        let mut tuple = CredentialTuple::new(ProviderId::Facebook, CredentialSource::Environment);
        tuple.set(CredentialField::PageId, Some("123".to_string()));
        assert!(!tuple.is_usable());
        tuple.set(CredentialField::PageAccessToken, Some("tok".to_string()));
        assert!(tuple.is_usable());
    }

    #[test]
    fn set_ignores_blank_values() {
        let mut tuple = CredentialTuple::new(ProviderId::Google, CredentialSource::Environment);
        tuple.set(CredentialField::ClientId, Some(String::new()));
        assert!(tuple.client_id.is_none());
    }
}
