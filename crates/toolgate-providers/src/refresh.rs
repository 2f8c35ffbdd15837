//! Token validation and refresh for refresh-token providers.
//!
//! Refresh is serialised per provider: a caller that finds the token stale
//! takes the provider's lease, re-reads the stored record, and only calls the
//! token endpoint if no one refreshed it in the meantime. The new record is
//! written before the lease is released and before the grant is returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use toolgate_core::ProviderId;
use tracing::{debug, error, info, warn};

use crate::credentials::{CredentialSource, CredentialTuple};
use crate::error::ProviderResult;
use crate::oauth::TokenEndpoint;
use crate::provider::{AccessGrant, reauth_error};
use crate::resolver::unusable_files;
use crate::store::{AppKeys, CredentialStore, PersistedCredentials};
use crate::tokens::{TokenState, apply_token_response, assess};

/// Validates access tokens and refreshes them when stale.
pub struct TokenRefresher {
    store: CredentialStore,
    endpoint: Arc<dyn TokenEndpoint>,
    skew: Duration,
    leases: HashMap<ProviderId, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for TokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefresher")
            .field("store", &self.store)
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

impl TokenRefresher {
    /// Creates a refresher. Tokens expiring within `skew` count as stale.
    pub fn new(store: CredentialStore, endpoint: Arc<dyn TokenEndpoint>, skew: Duration) -> Self {
        let leases = ProviderId::ALL
            .iter()
            .map(|p| (*p, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            store,
            endpoint,
            skew,
            leases,
        }
    }

    /// Reports the token state for `tuple` without touching the network.
    pub fn inspect(&self, tuple: &CredentialTuple) -> ProviderResult<TokenState> {
        let record = self.stored_record(tuple)?;
        let state = assess(&record, Utc::now(), self.skew);
        if state == TokenState::NeedsRefresh && tuple.refresh_token.is_none() {
            return Ok(TokenState::RefreshFailed);
        }
        Ok(state)
    }

    /// Returns the expiry of the stored record that belongs to `tuple`.
    pub fn expires_at(&self, tuple: &CredentialTuple) -> Option<DateTime<Utc>> {
        self.stored_record(tuple).ok().and_then(|record| record.expiry())
    }

    /// Returns a usable grant, refreshing first if the stored token is stale.
    ///
    /// A missing refresh token or a failed exchange is an authentication
    /// failure; it is never retried here.
    pub async fn ensure_valid(&self, tuple: &CredentialTuple) -> ProviderResult<AccessGrant> {
        let provider = tuple.provider;
        let record = self.stored_record(tuple)?;
        if assess(&record, Utc::now(), self.skew) == TokenState::Valid {
            debug!(provider = %provider, "stored access token valid");
            return Ok(grant(tuple, &record));
        }

        debug!(provider = %provider, "access token needs refresh");
        if tuple.refresh_token.is_none() {
            warn!(provider = %provider, "token expired and no refresh token available");
            return Err(reauth_error(provider, "no refresh token available"));
        }

        let lease = self.lease(provider);
        let _guard = lease.lock().await;

        let record = self.stored_record(tuple)?;
        if assess(&record, Utc::now(), self.skew) == TokenState::Valid {
            debug!(provider = %provider, "token refreshed by a concurrent call");
            return Ok(grant(tuple, &record));
        }

        self.refresh_locked(tuple, record).await
    }

    /// Refreshes unconditionally, ignoring any stored expiry.
    pub async fn force_refresh(&self, tuple: &CredentialTuple) -> ProviderResult<AccessGrant> {
        if tuple.refresh_token.is_none() {
            return Err(reauth_error(tuple.provider, "no refresh token available"));
        }
        let lease = self.lease(tuple.provider);
        let _guard = lease.lock().await;
        let record = self.stored_record(tuple)?;
        self.refresh_locked(tuple, record).await
    }

    async fn refresh_locked(
        &self,
        tuple: &CredentialTuple,
        mut record: PersistedCredentials,
    ) -> ProviderResult<AccessGrant> {
        let provider = tuple.provider;
        // A matching record carries the newest refresh token if the
        // provider rotated the tuple's one.
        let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
            tuple.client_id.clone(),
            tuple.client_secret.clone(),
            record.refresh_token.clone().or_else(|| tuple.refresh_token.clone()),
        ) else {
            return Err(reauth_error(provider, "incomplete credentials for refresh"));
        };

        let response = self
            .endpoint
            .refresh(provider, AppKeys::new(client_id, client_secret), refresh_token.clone())
            .await
            .map_err(|e| {
                warn!(provider = %provider, error = %e, "token refresh failed");
                reauth_error(provider, e.message()).with_source(e)
            })?;

        record.refresh_token = Some(refresh_token);
        apply_token_response(&mut record, &response, Utc::now());
        if tuple.source != CredentialSource::Files {
            record.refresh_origin = tuple.refresh_token.as_deref().map(fingerprint);
        }

        if tuple.source == CredentialSource::Override {
            debug!(provider = %provider, "override credentials refreshed in memory only");
        } else if let Err(e) = self.store.write_credentials(provider, &record) {
            // The grant is still good for this process; the next start
            // re-derives from whatever reached the disk.
            error!(provider = %provider, error = %e, "failed to persist refreshed token");
        }

        info!(provider = %provider, source = %tuple.source, "token refreshed");
        Ok(grant(tuple, &record))
    }

    fn lease(&self, provider: ProviderId) -> Arc<Mutex<()>> {
        self.leases
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| Arc::new(Mutex::new(())))
    }

    /// Loads the stored record if it belongs to the same grant as `tuple`.
    ///
    /// A record matches when it holds the tuple's refresh token or descends
    /// from it through rotation. Any other record was issued for other
    /// credentials and is ignored.
    fn stored_record(&self, tuple: &CredentialTuple) -> ProviderResult<PersistedCredentials> {
        let record = self
            .store
            .read_credentials(tuple.provider)
            .map_err(|e| unusable_files(tuple.provider, e))?
            .unwrap_or_default();

        let same_grant = match tuple.refresh_token.as_deref() {
            _ if tuple.source == CredentialSource::Files => true,
            Some(token) => {
                record.refresh_token.as_deref() == Some(token)
                    || record.refresh_origin.as_deref() == Some(fingerprint(token).as_str())
            }
            None => false,
        };
        if same_grant {
            Ok(record)
        } else {
            Ok(PersistedCredentials::default())
        }
    }
}

fn fingerprint(refresh_token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(refresh_token.as_bytes()))
}

fn grant(tuple: &CredentialTuple, record: &PersistedCredentials) -> AccessGrant {
    AccessGrant {
        provider: tuple.provider,
        source: tuple.source,
        access_token: record.access_token.clone().unwrap_or_default(),
        page_id: None,
        expires_at: record.expiry(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, ProviderErrorCode};
    use crate::testing::FakeEndpoint;

    fn google_tuple(source: CredentialSource) -> CredentialTuple {
        let mut tuple = CredentialTuple::new(ProviderId::Google, source);
        tuple.client_id = Some("abc".to_string());
        tuple.client_secret = Some("def".to_string());
        tuple.refresh_token = Some("ghi".to_string());
        tuple
    }

    fn stored(store: &CredentialStore, expiry_ms: Option<i64>, refresh: Option<&str>) {
        store
            .write_credentials(
                ProviderId::Google,
                &PersistedCredentials {
                    access_token: Some("old-access".to_string()),
                    refresh_token: refresh.map(str::to_string),
                    expiry_date: expiry_ms,
                    ..Default::default()
                },
            )
            .unwrap();
    }

    fn refresher(store: &CredentialStore, endpoint: &Arc<FakeEndpoint>) -> TokenRefresher {
        TokenRefresher::new(store.clone(), endpoint.clone(), Duration::ZERO)
    }

    #[tokio::test]
    async fn expired_one_millisecond_ago_refreshes_once_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        let past = Utc::now().timestamp_millis() - 1;
        stored(&store, Some(past), Some("ghi"));
        let endpoint = Arc::new(FakeEndpoint::new("fresh-access"));

        let grant = refresher(&store, &endpoint)
            .ensure_valid(&google_tuple(CredentialSource::Files))
            .await
            .unwrap();

        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(grant.access_token, "fresh-access");
        let record = store.read_credentials(ProviderId::Google).unwrap().unwrap();
        assert_eq!(record.access_token.as_deref(), Some("fresh-access"));
        assert_eq!(record.refresh_token.as_deref(), Some("ghi"));
        assert!(record.expiry_date.unwrap() > past);
    }

    #[tokio::test]
    async fn expired_without_refresh_token_makes_no_call() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        stored(&store, Some(Utc::now().timestamp_millis() - 1000), None);
        let endpoint = Arc::new(FakeEndpoint::new("unused"));

        let mut tuple = google_tuple(CredentialSource::Files);
        tuple.refresh_token = None;
        let refresher = refresher(&store, &endpoint);

        assert_eq!(refresher.inspect(&tuple).unwrap(), TokenState::RefreshFailed);
        let err = refresher.ensure_valid(&tuple).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
        assert!(err.message().contains("toolgate auth url google"));
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn missing_expiry_triggers_refresh() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        stored(&store, None, Some("ghi"));
        let endpoint = Arc::new(FakeEndpoint::new("fresh"));
        let refresher = refresher(&store, &endpoint);
        let tuple = google_tuple(CredentialSource::Files);

        assert_eq!(refresher.inspect(&tuple).unwrap(), TokenState::NeedsRefresh);
        refresher.ensure_valid(&tuple).await.unwrap();
        assert_eq!(endpoint.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn valid_token_is_reused_without_refresh() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        stored(&store, Some(Utc::now().timestamp_millis() + 3_600_000), Some("ghi"));
        let endpoint = Arc::new(FakeEndpoint::new("unused"));

        let grant = refresher(&store, &endpoint)
            .ensure_valid(&google_tuple(CredentialSource::Environment))
            .await
            .unwrap();
        assert_eq!(grant.access_token, "old-access");
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn environment_tuple_without_files_refreshes_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        let endpoint = Arc::new(FakeEndpoint::new("env-access"));

        refresher(&store, &endpoint)
            .ensure_valid(&google_tuple(CredentialSource::Environment))
            .await
            .unwrap();

        assert_eq!(endpoint.refresh_calls(), 1);
        let record = store.read_credentials(ProviderId::Google).unwrap().unwrap();
        assert_eq!(record.access_token.as_deref(), Some("env-access"));
    }

    #[tokio::test]
    async fn record_for_another_refresh_token_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        stored(&store, Some(Utc::now().timestamp_millis() + 3_600_000), Some("someone-else"));
        let endpoint = Arc::new(FakeEndpoint::new("mine"));

        let grant = refresher(&store, &endpoint)
            .ensure_valid(&google_tuple(CredentialSource::Environment))
            .await
            .unwrap();
        assert_eq!(grant.access_token, "mine");
        assert_eq!(endpoint.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn override_refresh_is_not_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        let endpoint = Arc::new(FakeEndpoint::new("override-access"));

        let grant = refresher(&store, &endpoint)
            .ensure_valid(&google_tuple(CredentialSource::Override))
            .await
            .unwrap();
        assert_eq!(grant.access_token, "override-access");
        assert!(store.read_credentials(ProviderId::Google).unwrap().is_none());
    }

    #[tokio::test]
    async fn rejected_refresh_is_authentication_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        stored(&store, None, Some("ghi"));
        let endpoint = Arc::new(FakeEndpoint::failing(ProviderError::authentication(
            "token refresh failed (400): invalid_grant",
        )));

        let err = refresher(&store, &endpoint)
            .ensure_valid(&google_tuple(CredentialSource::Files))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
        assert!(err.message().contains("invalid_grant"));
        assert_eq!(endpoint.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn network_failure_during_refresh_is_authentication_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        let endpoint = Arc::new(FakeEndpoint::failing(ProviderError::network("connection refused")));

        let err = refresher(&store, &endpoint)
            .ensure_valid(&google_tuple(CredentialSource::Environment))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_refresh() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        stored(&store, Some(Utc::now().timestamp_millis() - 1), Some("ghi"));
        let endpoint = Arc::new(FakeEndpoint::new("shared").with_delay(Duration::from_millis(50)));
        let refresher = Arc::new(refresher(&store, &endpoint));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let refresher = refresher.clone();
            handles.push(tokio::spawn(async move {
                refresher
                    .ensure_valid(&google_tuple(CredentialSource::Files))
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().access_token, "shared");
        }
        assert_eq!(endpoint.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn persist_failure_still_returns_refreshed_grant() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        let target = store.credentials_path(ProviderId::Google);
        let blocker = target.join("occupied");
        // A directory at the record's path makes the final rename fail.
        let endpoint = Arc::new(
            FakeEndpoint::new("fresh").on_refresh(move || std::fs::create_dir_all(&blocker).unwrap()),
        );

        let grant = refresher(&store, &endpoint)
            .ensure_valid(&google_tuple(CredentialSource::Environment))
            .await
            .unwrap();

        assert_eq!(grant.access_token, "fresh");
        assert_eq!(endpoint.refresh_calls(), 1);
        assert!(target.join("occupied").is_dir());
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn rotated_refresh_token_keeps_environment_record() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        let endpoint = Arc::new(FakeEndpoint::new("fresh").with_rotated_refresh_token("rotated"));
        let refresher = refresher(&store, &endpoint);
        let tuple = google_tuple(CredentialSource::Environment);

        refresher.ensure_valid(&tuple).await.unwrap();
        assert_eq!(endpoint.last_refresh_token().as_deref(), Some("ghi"));
        let record = store.read_credentials(ProviderId::Google).unwrap().unwrap();
        assert_eq!(record.refresh_token.as_deref(), Some("rotated"));
        assert_eq!(record.refresh_origin, Some(fingerprint("ghi")));

        let grant = refresher.ensure_valid(&tuple).await.unwrap();
        assert_eq!(grant.access_token, "fresh");
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(refresher.inspect(&tuple).unwrap(), TokenState::Valid);
        assert!(refresher.expires_at(&tuple).is_some());

        refresher.force_refresh(&tuple).await.unwrap();
        assert_eq!(endpoint.last_refresh_token().as_deref(), Some("rotated"));
        assert_eq!(endpoint.refresh_calls(), 2);
    }

    #[tokio::test]
    async fn force_refresh_ignores_valid_expiry() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        stored(&store, Some(Utc::now().timestamp_millis() + 3_600_000), Some("ghi"));
        let endpoint = Arc::new(FakeEndpoint::new("forced"));

        let grant = refresher(&store, &endpoint)
            .force_refresh(&google_tuple(CredentialSource::Files))
            .await
            .unwrap();
        assert_eq!(grant.access_token, "forced");
        assert_eq!(endpoint.refresh_calls(), 1);
    }
}
