//! Tool invocation wrapper.
//!
//! [`ToolContext`] is the composition root: it owns the store, the resolver,
//! the token endpoint, one credential provider per identity provider, and
//! the default-client cache. Every tool handler calls
//! [`ToolContext::invoke`] with its business logic:
//!
//! ```ignore
//! let response = ctx
//!     .invoke(ApiFamily::Gmail, overrides.as_ref(), |client| async move {
//!         client.get_json::<Profile>("users/me/profile", &[]).await
//!     })
//!     .await;
//! ```
//!
//! The sequence is resolve, authorize (refreshing if needed), construct or
//! reuse the client, run the operation, classify any failure. Nothing
//! escapes as a panic or an unclassified error.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use toolgate_core::{ApiFamily, EnvSource, ProviderId, Settings};
use tracing::{Instrument, debug, error, info_span, warn};

use crate::cache::ClientCache;
use crate::classify::classify;
use crate::client::{ApiClient, UpstreamError};
use crate::consent;
use crate::credentials::{CallOverrides, CredentialSource, CredentialTuple};
use crate::envelope::ToolResponse;
use crate::error::{ErrorCategory, ProviderError, ProviderResult};
use crate::oauth::{HttpTokenEndpoint, TokenEndpoint};
use crate::provider::{AccessGrant, CredentialProvider, provider_for};
use crate::refresh::TokenRefresher;
use crate::resolver::CredentialResolver;
use crate::store::{CredentialStore, PersistedCredentials};
use crate::tokens::TokenState;

/// Credential status of one provider, as reported by `toolgate status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialStatus {
    pub provider: ProviderId,
    pub source: Option<CredentialSource>,
    pub state: TokenState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Shared state for every tool invocation in one process.
pub struct ToolContext {
    settings: Settings,
    resolver: CredentialResolver,
    endpoint: Arc<dyn TokenEndpoint>,
    providers: HashMap<ProviderId, Arc<dyn CredentialProvider>>,
    cache: ClientCache,
    base_urls: HashMap<ApiFamily, String>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("settings", &self.settings)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ToolContext {
    /// Creates a context talking to the real token endpoints.
    pub fn new(settings: Settings, env: Arc<dyn EnvSource>) -> ProviderResult<Self> {
        let endpoint = HttpTokenEndpoint::new(settings.http_timeout)?;
        Ok(Self::with_endpoint(settings, env, Arc::new(endpoint)))
    }

    /// Creates a context with a custom token endpoint.
    pub fn with_endpoint(
        settings: Settings,
        env: Arc<dyn EnvSource>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        let store = CredentialStore::new(settings.config_dir.clone());
        let resolver = CredentialResolver::new(store.clone(), env);
        let refresher = Arc::new(TokenRefresher::new(
            store,
            endpoint.clone(),
            settings.expiry_skew,
        ));
        let providers = ProviderId::ALL
            .iter()
            .map(|id| {
                (
                    *id,
                    provider_for(*id, resolver.clone(), refresher.clone(), settings.expiry_skew),
                )
            })
            .collect();

        Self {
            settings,
            resolver,
            endpoint,
            providers,
            cache: ClientCache::new(),
            base_urls: HashMap::new(),
        }
    }

    /// Points clients of `family` at another base URL.
    pub fn with_base_url(mut self, family: ApiFamily, url: impl Into<String>) -> Self {
        self.base_urls.insert(family, url.into());
        self
    }

    /// Returns the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the credential store.
    pub fn store(&self) -> &CredentialStore {
        self.resolver.store()
    }

    /// Returns the resolver.
    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    /// Returns the default-client cache.
    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// Returns the strategy for `id`.
    pub fn provider(&self, id: ProviderId) -> ProviderResult<&Arc<dyn CredentialProvider>> {
        self.providers.get(&id).ok_or_else(|| {
            ProviderError::configuration(format!("no credential provider registered for {}", id))
        })
    }

    fn resolve(
        &self,
        id: ProviderId,
        overrides: Option<&CallOverrides>,
    ) -> ProviderResult<(&Arc<dyn CredentialProvider>, CredentialTuple)> {
        let provider = self.provider(id)?;
        let tuple = provider.resolve(overrides)?.ok_or_else(|| {
            ProviderError::configuration(format!(
                "could not create client for {}, check credentials: set the {}_* environment \
                 variables or run `{}`",
                id.display_name(),
                id.env_prefix(),
                id.auth_command()
            ))
            .with_provider(id.as_str())
        })?;
        Ok((provider, tuple))
    }

    fn build_client(&self, family: ApiFamily, grant: AccessGrant) -> ProviderResult<ApiClient> {
        let client = ApiClient::new(family, grant, self.settings.http_timeout)?;
        Ok(match self.base_urls.get(&family) {
            Some(url) => client.with_base_url(url.clone()),
            None => client,
        })
    }

    /// Returns an authenticated client for `family`.
    ///
    /// Clients built from overrides are never cached and never served from
    /// the cache.
    pub async fn client(
        &self,
        family: ApiFamily,
        overrides: Option<&CallOverrides>,
    ) -> ProviderResult<ApiClient> {
        let overrides = overrides.filter(|o| !o.is_empty());
        let (provider, tuple) = self.resolve(family.provider(), overrides)?;
        let grant = provider.authorize(&tuple).await?;

        if tuple.source == CredentialSource::Override {
            debug!(family = %family, "building one-off client for override credentials");
            return self.build_client(family, grant);
        }

        if let Some(client) = self.cache.get_current(family, &grant.access_token) {
            debug!(family = %family, "reusing cached client");
            return Ok(client);
        }

        let client = self.build_client(family, grant)?;
        self.cache.insert(client.clone());
        Ok(client)
    }

    /// Runs `op` with an authenticated client and wraps the outcome.
    ///
    /// The operation's result is returned unchanged on success. Every failure
    /// is logged and classified into the envelope.
    pub async fn invoke<T, F, Fut>(
        &self,
        family: ApiFamily,
        overrides: Option<&CallOverrides>,
        op: F,
    ) -> ToolResponse<T>
    where
        F: FnOnce(ApiClient) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let has_overrides = overrides.is_some_and(|o| !o.is_empty());
        let span = info_span!("tool_call", family = %family, overrides = has_overrides);

        async move {
            let client = match self.client(family, overrides).await {
                Ok(client) => client,
                Err(e) => {
                    log_failure(family, &e);
                    return ToolResponse::failure(&e);
                }
            };

            match op(client).await {
                Ok(data) => {
                    debug!("tool call succeeded");
                    ToolResponse::ok(data)
                }
                Err(upstream) => {
                    let classified = classify(family, &upstream);
                    if classified.category() == ErrorCategory::Authentication && !has_overrides {
                        self.cache.invalidate(family);
                    }
                    log_failure(family, &classified);
                    ToolResponse::failure(&classified)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Reports how `id` would resolve and whether its token is usable,
    /// without refreshing.
    pub fn status(&self, id: ProviderId) -> CredentialStatus {
        let mut status = CredentialStatus {
            provider: id,
            source: None,
            state: TokenState::Unknown,
            expires_at: None,
            detail: None,
        };

        let provider = match self.provider(id) {
            Ok(provider) => provider,
            Err(e) => {
                status.detail = Some(e.message().to_string());
                return status;
            }
        };
        let tuple = match provider.resolve(None) {
            Ok(Some(tuple)) => tuple,
            Ok(None) => {
                status.detail = Some(format!("no credentials; run `{}`", id.auth_command()));
                return status;
            }
            Err(e) => {
                status.detail = Some(e.message().to_string());
                return status;
            }
        };

        status.source = Some(tuple.source);
        match provider.inspect(&tuple) {
            Ok(state) => {
                status.state = state;
                status.expires_at = provider.expires_at(&tuple);
            }
            Err(e) => status.detail = Some(e.message().to_string()),
        }
        status
    }

    /// Forces a refresh of the default credentials for `id`.
    pub async fn refresh(&self, id: ProviderId) -> ProviderResult<AccessGrant> {
        let (provider, tuple) = self.resolve(id, None)?;
        let grant = provider.refresh(&tuple).await?;
        self.cache.invalidate_provider(id);
        Ok(grant)
    }

    /// Validates the default credentials for `id`, refreshing only if stale.
    pub async fn validate(&self, id: ProviderId) -> ProviderResult<AccessGrant> {
        let (provider, tuple) = self.resolve(id, None)?;
        provider.authorize(&tuple).await
    }

    /// Completes interactive consent and persists the resulting record.
    pub async fn complete_consent(
        &self,
        id: ProviderId,
        code: &str,
        verifier: Option<&str>,
    ) -> ProviderResult<PersistedCredentials> {
        let record = consent::complete_consent(
            &self.resolver,
            self.endpoint.as_ref(),
            id,
            code,
            &self.settings.redirect_uri(),
            verifier,
        )
        .await?;
        self.cache.invalidate_provider(id);
        Ok(record)
    }
}

fn log_failure(family: ApiFamily, e: &ProviderError) {
    match e.category() {
        ErrorCategory::Operation => {
            error!(family = %family, code = %e.code(), error = %e.message(), "tool call failed")
        }
        _ => warn!(family = %family, code = %e.code(), error = %e.message(), "tool call failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::testing::FakeEndpoint;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn env(pairs: &[(&str, &str)]) -> Arc<dyn EnvSource> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(map)
    }

    fn context(
        dir: &std::path::Path,
        pairs: &[(&str, &str)],
        endpoint: &Arc<FakeEndpoint>,
    ) -> ToolContext {
        let settings = Settings::new(dir).with_http_timeout(Duration::from_secs(5));
        ToolContext::with_endpoint(settings, env(pairs), endpoint.clone())
    }

    async fn token_of(ctx: &ToolContext, family: ApiFamily, overrides: Option<&CallOverrides>) -> ToolResponse<String> {
        ctx.invoke(family, overrides, |client| async move {
            Ok::<_, UpstreamError>(client.grant().access_token.clone())
        })
        .await
    }

    const GOOGLE_ENV: &[(&str, &str)] = &[
        ("GOOGLE_CLIENT_ID", "abc"),
        ("GOOGLE_CLIENT_SECRET", "def"),
        ("GOOGLE_REFRESH_TOKEN", "ghi"),
    ];

    #[tokio::test]
    async fn environment_credentials_refresh_before_first_call() {
        let tmp = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("fresh"));
        let ctx = context(tmp.path(), GOOGLE_ENV, &endpoint);

        let response = token_of(&ctx, ApiFamily::Gmail, None).await;
        assert_eq!(response, ToolResponse::ok("fresh".to_string()));
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(endpoint.last_refresh_token().as_deref(), Some("ghi"));

        // The persisted token is reused, and the cached client with it.
        let response = token_of(&ctx, ApiFamily::Gmail, None).await;
        assert!(response.is_success());
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(ctx.cache().len(), 1);
    }

    #[tokio::test]
    async fn facebook_file_token_needs_no_refresh() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("facebook-credentials.json"),
            r#"{"page_access_token": "tok", "page_id": "123"}"#,
        )
        .unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("unused"));
        let ctx = context(tmp.path(), &[], &endpoint);

        let response = ctx
            .invoke(ApiFamily::Facebook, None, |client| async move {
                Ok::<_, UpstreamError>((
                    client.grant().access_token.clone(),
                    client.page_id().map(str::to_string),
                ))
            })
            .await;
        assert_eq!(
            response,
            ToolResponse::ok(("tok".to_string(), Some("123".to_string())))
        );
        assert_eq!(endpoint.refresh_calls(), 0);
        assert_eq!(endpoint.exchange_calls(), 0);
    }

    #[tokio::test]
    async fn insufficient_scope_is_a_permission_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "insufficient_scope"}
            })))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("fresh"));
        let ctx = context(tmp.path(), GOOGLE_ENV, &endpoint).with_base_url(ApiFamily::Gmail, server.uri());

        let response = ctx
            .invoke(ApiFamily::Gmail, None, |client| async move {
                client
                    .get_json::<serde_json::Value>("users/me/messages", &[])
                    .await
            })
            .await;

        assert!(!response.is_success());
        assert_eq!(response.kind(), Some(ErrorCategory::Permission));
        let message = response.error.unwrap();
        assert!(message.contains("https://www.googleapis.com/auth/gmail.send"));
    }

    #[tokio::test]
    async fn no_credentials_is_a_configuration_envelope() {
        let tmp = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("unused"));
        let ctx = context(tmp.path(), &[], &endpoint);

        for family in ApiFamily::ALL {
            let response = token_of(&ctx, family, None).await;
            assert_eq!(response.kind(), Some(ErrorCategory::Configuration));
            assert!(response.error.unwrap().contains("could not create client"));
        }
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_configuration_envelope() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("gcp-oauth.keys.json"), "not json").unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("unused"));
        let ctx = context(tmp.path(), &[], &endpoint);

        let response = token_of(&ctx, ApiFamily::Calendar, None).await;
        assert_eq!(response.kind(), Some(ErrorCategory::Configuration));
    }

    #[tokio::test]
    async fn failed_refresh_is_an_authentication_envelope() {
        let tmp = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(FakeEndpoint::failing(ProviderError::authentication(
            "token refresh failed (400): invalid_grant",
        )));
        let ctx = context(tmp.path(), GOOGLE_ENV, &endpoint);

        let response = token_of(&ctx, ApiFamily::Calendar, None).await;
        assert_eq!(response.kind(), Some(ErrorCategory::Authentication));
        assert!(response.error.unwrap().contains("toolgate auth url google"));
        assert_eq!(endpoint.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn overrides_bypass_and_never_pollute_the_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("fresh"));
        let ctx = context(tmp.path(), &[("LINKEDIN_ACCESS_TOKEN", "default-li")], &endpoint);

        let response = token_of(&ctx, ApiFamily::LinkedIn, None).await;
        assert_eq!(response, ToolResponse::ok("default-li".to_string()));
        assert_eq!(ctx.cache().len(), 1);

        let overrides = CallOverrides::new().with_access_token("caller-li");
        for _ in 0..2 {
            let response = token_of(&ctx, ApiFamily::LinkedIn, Some(&overrides)).await;
            assert_eq!(response, ToolResponse::ok("caller-li".to_string()));
        }
        assert_eq!(overrides, CallOverrides::new().with_access_token("caller-li"));

        let cached = ctx.cache().get(ApiFamily::LinkedIn).unwrap();
        assert_eq!(cached.grant().access_token, "default-li");
        let response = token_of(&ctx, ApiFamily::LinkedIn, None).await;
        assert_eq!(response, ToolResponse::ok("default-li".to_string()));
    }

    #[tokio::test]
    async fn repeated_override_calls_are_independent() {
        let tmp = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("override-access"));
        let ctx = context(tmp.path(), &[], &endpoint);
        let overrides = CallOverrides::new()
            .with_client_id("o-id")
            .with_client_secret("o-secret")
            .with_refresh_token("o-refresh");

        let first = token_of(&ctx, ApiFamily::Gmail, Some(&overrides)).await;
        let second = token_of(&ctx, ApiFamily::Gmail, Some(&overrides)).await;
        assert_eq!(first, second);
        assert!(first.is_success());
        assert!(ctx.cache().is_empty());
        assert!(ctx.store().read_credentials(ProviderId::Google).unwrap().is_none());
    }

    #[tokio::test]
    async fn upstream_unauthorized_drops_cached_client() {
        let tmp = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("unused"));
        let ctx = context(tmp.path(), &[("LINKEDIN_ACCESS_TOKEN", "li")], &endpoint);

        let response: ToolResponse<()> = ctx
            .invoke(ApiFamily::LinkedIn, None, |_client| async move {
                Err(UpstreamError::Status {
                    status: 401,
                    body: "Invalid access token".to_string(),
                })
            })
            .await;
        assert_eq!(response.kind(), Some(ErrorCategory::Authentication));
        assert!(response.error.unwrap().contains("toolgate auth url linkedin"));
        assert!(ctx.cache().is_empty());
    }

    #[tokio::test]
    async fn operation_errors_keep_upstream_message() {
        let tmp = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("unused"));
        let ctx = context(tmp.path(), &[("LINKEDIN_ACCESS_TOKEN", "li")], &endpoint);

        let response: ToolResponse<()> = ctx
            .invoke(ApiFamily::LinkedIn, None, |_client| async move {
                Err(UpstreamError::message("post text exceeds 3000 characters"))
            })
            .await;
        assert_eq!(response.kind(), Some(ErrorCategory::Operation));
        assert_eq!(
            response.error.as_deref(),
            Some("post text exceeds 3000 characters")
        );
    }

    #[tokio::test]
    async fn status_reports_source_and_state() {
        let tmp = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("fresh"));
        let ctx = context(tmp.path(), GOOGLE_ENV, &endpoint);

        let status = ctx.status(ProviderId::Google);
        assert_eq!(status.source, Some(CredentialSource::Environment));
        assert_eq!(status.state, TokenState::NeedsRefresh);

        ctx.validate(ProviderId::Google).await.unwrap();
        let status = ctx.status(ProviderId::Google);
        assert_eq!(status.state, TokenState::Valid);
        assert!(status.expires_at.is_some());

        let status = ctx.status(ProviderId::Facebook);
        assert_eq!(status.source, None);
        assert_eq!(status.state, TokenState::Unknown);
        assert!(status.detail.unwrap().contains("toolgate auth url facebook"));
        assert_eq!(endpoint.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn status_ignores_expiry_of_another_grant() {
        let tmp = tempfile::tempdir().unwrap();
        let future = chrono::Utc::now().timestamp_millis() + 3_600_000;
        std::fs::write(
            tmp.path().join("google-credentials.json"),
            format!(r#"{{"access_token":"theirs","refresh_token":"other","expiry_date":{}}}"#, future),
        )
        .unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("fresh"));
        let ctx = context(tmp.path(), GOOGLE_ENV, &endpoint);

        let status = ctx.status(ProviderId::Google);
        assert_eq!(status.source, Some(CredentialSource::Environment));
        assert_eq!(status.state, TokenState::NeedsRefresh);
        assert_eq!(status.expires_at, None);
    }

    #[tokio::test]
    async fn environment_keys_with_file_refresh_token() {
        let tmp = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("fresh"));
        let pairs = [("GOOGLE_CLIENT_ID", "abc"), ("GOOGLE_CLIENT_SECRET", "def")];
        let ctx = context(tmp.path(), &pairs, &endpoint);

        // The layout `auth complete` leaves behind when the keys live in the
        // environment.
        ctx.complete_consent(ProviderId::Google, "code", Some("v")).await.unwrap();
        let response = token_of(&ctx, ApiFamily::Gmail, None).await;
        assert_eq!(response, ToolResponse::ok("fresh".to_string()));
        assert_eq!(endpoint.refresh_calls(), 0);

        std::fs::write(
            tmp.path().join("google-credentials.json"),
            r#"{"access_token":"old","refresh_token":"file-rt","expiry_date":1}"#,
        )
        .unwrap();
        let ctx = context(tmp.path(), &pairs, &endpoint);
        let response = token_of(&ctx, ApiFamily::Calendar, None).await;
        assert_eq!(response, ToolResponse::ok("fresh".to_string()));
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(endpoint.last_refresh_token().as_deref(), Some("file-rt"));
    }

    #[tokio::test]
    async fn environment_keys_without_keys_file_are_a_configuration_envelope() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("google-credentials.json"),
            r#"{"access_token":"old","refresh_token":"file-rt","expiry_date":1}"#,
        )
        .unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("fresh"));
        let ctx = context(
            tmp.path(),
            &[("GOOGLE_CLIENT_ID", "abc"), ("GOOGLE_CLIENT_SECRET", "def")],
            &endpoint,
        );

        let response = token_of(&ctx, ApiFamily::Gmail, None).await;
        assert_eq!(response.kind(), Some(ErrorCategory::Configuration));
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn refresh_forces_exchange() {
        let tmp = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(FakeEndpoint::new("fresh"));
        let ctx = context(tmp.path(), GOOGLE_ENV, &endpoint);

        ctx.refresh(ProviderId::Google).await.unwrap();
        ctx.refresh(ProviderId::Google).await.unwrap();
        assert_eq!(endpoint.refresh_calls(), 2);

        let err = ctx.refresh(ProviderId::LinkedIn).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ConfigurationError);
    }
}
