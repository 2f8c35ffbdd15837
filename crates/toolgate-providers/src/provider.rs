//! Credential provider abstraction.
//!
//! The invocation wrapper is provider-agnostic: it asks a
//! [`CredentialProvider`] to resolve a tuple and then to authorize it,
//! receiving an [`AccessGrant`] it can build an API client from.
//!
//! Two strategies exist:
//!
//! - [`RefreshTokenProvider`] keeps a short-lived access token alive from a
//!   refresh token (Google).
//! - [`StaticTokenProvider`] uses a long-lived token as-is and only learns it
//!   expired when the upstream rejects it (LinkedIn, Facebook).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use toolgate_core::{ProviderId, TokenFlow};
use tracing::{debug, warn};

use crate::credentials::{CallOverrides, CredentialSource, CredentialTuple};
use crate::error::{ProviderError, ProviderResult};
use crate::refresh::TokenRefresher;
use crate::resolver::{CredentialResolver, unusable_files};
use crate::tokens::{TokenState, assess};

/// A boxed future for async trait methods.
///
/// Keeps the provider traits object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A validated access token, ready to be attached to API requests.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub provider: ProviderId,
    pub source: CredentialSource,
    pub access_token: String,
    /// Facebook page the token is scoped to.
    pub page_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGrant")
            .field("provider", &self.provider)
            .field("source", &self.source)
            .field("access_token", &"<redacted>")
            .field("page_id", &self.page_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Builds the authentication error returned when credentials must be
/// re-issued through interactive consent.
pub(crate) fn reauth_error(provider: ProviderId, detail: &str) -> ProviderError {
    ProviderError::authentication(format!(
        "{} credentials invalid, please re-authenticate ({}): run `{}`",
        provider.display_name(),
        detail,
        provider.auth_command()
    ))
    .with_provider(provider.as_str())
}

/// Resolution and validation strategy for one identity provider.
pub trait CredentialProvider: Send + Sync {
    /// Returns the provider this strategy serves.
    fn id(&self) -> ProviderId;

    /// Resolves a usable credential tuple, or `None`.
    fn resolve(&self, overrides: Option<&CallOverrides>) -> ProviderResult<Option<CredentialTuple>>;

    /// Validates `tuple`, refreshing if needed, and returns a grant.
    fn authorize<'a>(&'a self, tuple: &'a CredentialTuple)
    -> BoxFuture<'a, ProviderResult<AccessGrant>>;

    /// Reports the token state without network access.
    fn inspect(&self, tuple: &CredentialTuple) -> ProviderResult<TokenState>;

    /// Returns the expiry of the token [`inspect`](Self::inspect) judged,
    /// if one is known.
    fn expires_at(&self, _tuple: &CredentialTuple) -> Option<DateTime<Utc>> {
        None
    }

    /// Forces a refresh.
    ///
    /// The default implementation reports that the provider has no refresh
    /// concept.
    fn refresh<'a>(&'a self, tuple: &'a CredentialTuple) -> BoxFuture<'a, ProviderResult<AccessGrant>> {
        let provider = tuple.provider;
        Box::pin(async move {
            Err(ProviderError::configuration(format!(
                "{} tokens cannot be refreshed; run `{}` to issue a new one",
                provider.display_name(),
                provider.auth_command()
            ))
            .with_provider(provider.as_str()))
        })
    }
}

/// Google-style provider: refresh-token grant with persisted expiry.
pub struct RefreshTokenProvider {
    id: ProviderId,
    resolver: CredentialResolver,
    refresher: Arc<TokenRefresher>,
}

impl RefreshTokenProvider {
    /// Creates the strategy for `id`.
    pub fn new(id: ProviderId, resolver: CredentialResolver, refresher: Arc<TokenRefresher>) -> Self {
        Self {
            id,
            resolver,
            refresher,
        }
    }
}

impl CredentialProvider for RefreshTokenProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn resolve(&self, overrides: Option<&CallOverrides>) -> ProviderResult<Option<CredentialTuple>> {
        self.resolver.resolve(self.id, overrides)
    }

    fn authorize<'a>(
        &'a self,
        tuple: &'a CredentialTuple,
    ) -> BoxFuture<'a, ProviderResult<AccessGrant>> {
        Box::pin(self.refresher.ensure_valid(tuple))
    }

    fn inspect(&self, tuple: &CredentialTuple) -> ProviderResult<TokenState> {
        self.refresher.inspect(tuple)
    }

    fn expires_at(&self, tuple: &CredentialTuple) -> Option<DateTime<Utc>> {
        self.refresher.expires_at(tuple)
    }

    fn refresh<'a>(&'a self, tuple: &'a CredentialTuple) -> BoxFuture<'a, ProviderResult<AccessGrant>> {
        Box::pin(self.refresher.force_refresh(tuple))
    }
}

/// LinkedIn/Facebook-style provider: a long-lived token used as-is.
pub struct StaticTokenProvider {
    id: ProviderId,
    resolver: CredentialResolver,
    skew: Duration,
}

impl StaticTokenProvider {
    /// Creates the strategy for `id`.
    pub fn new(id: ProviderId, resolver: CredentialResolver, skew: Duration) -> Self {
        Self { id, resolver, skew }
    }

    fn grant(&self, tuple: &CredentialTuple) -> ProviderResult<AccessGrant> {
        match self.id {
            ProviderId::Facebook => {
                let token = tuple
                    .page_access_token
                    .clone()
                    .ok_or_else(|| reauth_error(self.id, "no page access token"))?;
                Ok(AccessGrant {
                    provider: self.id,
                    source: tuple.source,
                    access_token: token,
                    page_id: tuple.page_id.clone(),
                    expires_at: None,
                })
            }
            _ => self.linkedin_grant(tuple),
        }
    }

    /// The access token is taken from the tuple or, failing that, from the
    /// credentials file. A recorded expiry is honoured when present.
    fn linkedin_grant(&self, tuple: &CredentialTuple) -> ProviderResult<AccessGrant> {
        let record = self
            .resolver
            .store()
            .read_credentials(self.id)
            .map_err(|e| unusable_files(self.id, e))?
            .unwrap_or_default();

        let (token, from_record) = match tuple.access_token.clone() {
            Some(token) => {
                let same = record.access_token.as_deref() == Some(token.as_str());
                (token, same)
            }
            None => match record.access_token.clone() {
                Some(token) => (token, true),
                None => {
                    warn!(provider = %self.id, "no access token recorded");
                    return Err(reauth_error(self.id, "no access token"));
                }
            },
        };

        let expires_at = if from_record { record.expiry() } else { None };
        if from_record
            && expires_at.is_some()
            && assess(&record, Utc::now(), self.skew) != TokenState::Valid
        {
            warn!(provider = %self.id, "recorded access token has expired");
            return Err(reauth_error(self.id, "access token expired"));
        }

        Ok(AccessGrant {
            provider: self.id,
            source: tuple.source,
            access_token: token,
            page_id: None,
            expires_at,
        })
    }
}

impl CredentialProvider for StaticTokenProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn resolve(&self, overrides: Option<&CallOverrides>) -> ProviderResult<Option<CredentialTuple>> {
        self.resolver.resolve(self.id, overrides)
    }

    fn authorize<'a>(
        &'a self,
        tuple: &'a CredentialTuple,
    ) -> BoxFuture<'a, ProviderResult<AccessGrant>> {
        let result = self.grant(tuple);
        if result.is_ok() {
            debug!(provider = %self.id, source = %tuple.source, "static token accepted");
        }
        Box::pin(async move { result })
    }

    fn inspect(&self, tuple: &CredentialTuple) -> ProviderResult<TokenState> {
        match self.grant(tuple) {
            Ok(_) => Ok(TokenState::Valid),
            Err(e) if e.code() == crate::error::ProviderErrorCode::AuthenticationFailed => {
                Ok(TokenState::RefreshFailed)
            }
            Err(e) => Err(e),
        }
    }

    fn expires_at(&self, tuple: &CredentialTuple) -> Option<DateTime<Utc>> {
        self.grant(tuple).ok().and_then(|grant| grant.expires_at)
    }
}

/// Builds the strategy matching `id`'s token flow.
pub fn provider_for(
    id: ProviderId,
    resolver: CredentialResolver,
    refresher: Arc<TokenRefresher>,
    skew: Duration,
) -> Arc<dyn CredentialProvider> {
    match id.token_flow() {
        TokenFlow::RefreshToken => Arc::new(RefreshTokenProvider::new(id, resolver, refresher)),
        TokenFlow::StaticToken => Arc::new(StaticTokenProvider::new(id, resolver, skew)),
    }
}
