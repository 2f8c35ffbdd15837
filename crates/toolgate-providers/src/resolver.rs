//! Credential source resolution.
//!
//! Sources are tried in two tiers:
//!
//! 1. call-scoped overrides merged field by field over `<PROVIDER>_*`
//!    environment variables (the override wins per field)
//! 2. the keys file plus the credentials file, taken together
//!
//! If tier 1 does not yield the provider's minimum field set it is discarded
//! whole; fields from the two tiers are never mixed.

use std::sync::Arc;

use toolgate_core::{EnvSource, ProviderId};
use tracing::{debug, warn};

use crate::credentials::{CallOverrides, CredentialField, CredentialSource, CredentialTuple};
use crate::error::{ProviderError, ProviderResult};
use crate::store::{AppKeys, CredentialStore};

/// Resolves credential tuples from overrides, environment and files.
#[derive(Clone)]
pub struct CredentialResolver {
    store: CredentialStore,
    env: Arc<dyn EnvSource>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl CredentialResolver {
    /// Creates a resolver over `store` and `env`.
    pub fn new(store: CredentialStore, env: Arc<dyn EnvSource>) -> Self {
        Self { store, env }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Resolves a usable tuple for `provider`.
    ///
    /// Returns `Ok(None)` when no source yields a usable tuple. A keys or
    /// credentials file that cannot be parsed is reported as a
    /// configuration error rather than a parse failure.
    pub fn resolve(
        &self,
        provider: ProviderId,
        overrides: Option<&CallOverrides>,
    ) -> ProviderResult<Option<CredentialTuple>> {
        if let Some(tuple) = self.from_overrides_and_env(provider, overrides) {
            if tuple.is_usable() {
                debug!(provider = %provider, source = %tuple.source, "resolved credentials");
                return Ok(Some(tuple));
            }
            debug!(
                provider = %provider,
                source = %tuple.source,
                "incomplete credentials, falling back to files"
            );
        }

        let tuple = self
            .from_files(provider)
            .map_err(|e| unusable_files(provider, e))?;

        match tuple {
            Some(tuple) if tuple.is_usable() => {
                debug!(provider = %provider, source = %tuple.source, "resolved credentials");
                Ok(Some(tuple))
            }
            _ => {
                debug!(provider = %provider, "no usable credentials");
                Ok(None)
            }
        }
    }

    /// Returns the application keys for `provider`, preferring the
    /// environment over the keys file.
    pub fn app_keys(&self, provider: ProviderId) -> ProviderResult<Option<AppKeys>> {
        let id = self.env_field(provider, CredentialField::ClientId);
        let secret = self.env_field(provider, CredentialField::ClientSecret);
        if let (Some(id), Some(secret)) = (id, secret) {
            return Ok(Some(AppKeys::new(id, secret)));
        }
        self.store.read_keys(provider)
    }

    /// Returns the raw environment value of `field` for `provider`.
    pub fn env_field(&self, provider: ProviderId, field: CredentialField) -> Option<String> {
        self.env.var(&provider.env_var(field.env_suffix()))
    }

    fn from_overrides_and_env(
        &self,
        provider: ProviderId,
        overrides: Option<&CallOverrides>,
    ) -> Option<CredentialTuple> {
        let mut tuple = CredentialTuple::new(provider, CredentialSource::Environment);
        let mut found = false;

        for &field in CredentialField::for_provider(provider) {
            let from_override = overrides.and_then(|o| o.get(field)).map(str::to_string);
            let value = if from_override.is_some() {
                tuple.source = CredentialSource::Override;
                from_override
            } else {
                self.env_field(provider, field)
            };
            found |= value.is_some();
            tuple.set(field, value);
        }

        found.then_some(tuple)
    }

    fn from_files(&self, provider: ProviderId) -> ProviderResult<Option<CredentialTuple>> {
        let keys = self.store.read_keys(provider)?;
        let record = self.store.read_credentials(provider)?;
        if keys.is_none() && record.is_none() {
            return Ok(None);
        }

        let mut tuple = CredentialTuple::new(provider, CredentialSource::Files);
        if let Some(keys) = keys {
            tuple.set(CredentialField::ClientId, Some(keys.client_id));
            tuple.set(CredentialField::ClientSecret, Some(keys.client_secret));
        }
        if let Some(record) = record {
            tuple.set(CredentialField::RefreshToken, record.refresh_token);
            tuple.set(CredentialField::AccessToken, record.access_token);
            tuple.set(CredentialField::PageAccessToken, record.page_access_token);
            tuple.set(CredentialField::PageId, record.page_id);
        }
        Ok(Some(tuple))
    }
}

/// Turns a store failure into the configuration error reported to callers.
pub(crate) fn unusable_files(provider: ProviderId, e: ProviderError) -> ProviderError {
    warn!(provider = %provider, error = %e, "credential files unreadable");
    ProviderError::configuration(format!(
        "could not create client for {}, check credentials: {}",
        provider.display_name(),
        e.message()
    ))
    .with_provider(provider.as_str())
    .with_source(e)
}
