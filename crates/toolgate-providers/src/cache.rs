//! Default-credential client cache.
//!
//! Only clients built from non-override credentials are cached. The cache is
//! owned by the tool context, so each context (and each test) starts empty.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use toolgate_core::{ApiFamily, ProviderId};
use tracing::debug;

use crate::client::ApiClient;

/// Per-family cache of API clients.
#[derive(Debug, Default)]
pub struct ClientCache {
    clients: RwLock<HashMap<ApiFamily, ApiClient>>,
}

impl ClientCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached client for `family`.
    pub fn get(&self, family: ApiFamily) -> Option<ApiClient> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&family)
            .cloned()
    }

    /// Returns the cached client if it still carries `access_token`.
    pub fn get_current(&self, family: ApiFamily, access_token: &str) -> Option<ApiClient> {
        self.get(family)
            .filter(|client| client.grant().access_token == access_token)
    }

    /// Caches `client` for its family, replacing any previous entry.
    pub fn insert(&self, client: ApiClient) {
        let family = client.family();
        debug!(family = %family, "caching default client");
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(family, client);
    }

    /// Drops the cached client for `family`.
    pub fn invalidate(&self, family: ApiFamily) -> bool {
        let removed = self
            .clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&family)
            .is_some();
        if removed {
            debug!(family = %family, "dropped cached client");
        }
        removed
    }

    /// Drops every cached client backed by `provider`.
    pub fn invalidate_provider(&self, provider: ProviderId) {
        for family in provider.families() {
            self.invalidate(*family);
        }
    }

    /// Empties the cache.
    pub fn clear(&self) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
