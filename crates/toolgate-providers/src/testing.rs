//! In-memory token endpoint for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use toolgate_core::ProviderId;

use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::oauth::{PageToken, TokenEndpoint};
use crate::provider::BoxFuture;
use crate::store::AppKeys;
use crate::tokens::TokenResponse;

/// Counts exchanges and answers with a fixed token or a fixed error.
pub(crate) struct FakeEndpoint {
    access_token: String,
    failure: Option<(ProviderErrorCode, String)>,
    delay: Duration,
    pages: Vec<PageToken>,
    rotated_refresh_token: Option<String>,
    on_refresh: Option<Box<dyn Fn() + Send + Sync>>,
    refresh_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
    last_refresh_token: Mutex<Option<String>>,
}

impl FakeEndpoint {
    pub(crate) fn new(access_token: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
            failure: None,
            delay: Duration::ZERO,
            pages: Vec::new(),
            rotated_refresh_token: None,
            on_refresh: None,
            refresh_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            last_refresh_token: Mutex::new(None),
        }
    }

    pub(crate) fn failing(error: ProviderError) -> Self {
        let mut endpoint = Self::new("");
        endpoint.failure = Some((error.code(), error.message().to_string()));
        endpoint
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn with_pages(mut self, pages: Vec<PageToken>) -> Self {
        self.pages = pages;
        self
    }

    /// Answers refreshes with a new refresh token.
    pub(crate) fn with_rotated_refresh_token(mut self, token: &str) -> Self {
        self.rotated_refresh_token = Some(token.to_string());
        self
    }

    /// Runs `hook` when a refresh is requested, before answering.
    pub(crate) fn on_refresh(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_refresh = Some(Box::new(hook));
        self
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().unwrap().clone()
    }

    fn answer(&self) -> ProviderResult<TokenResponse> {
        match self.failure {
            Some((code, ref message)) => Err(ProviderError::new(code, message.clone())),
            None => Ok(TokenResponse::new(self.access_token.clone()).with_expires_in(3600)),
        }
    }
}

impl TokenEndpoint for FakeEndpoint {
    fn refresh(
        &self,
        _provider: ProviderId,
        _keys: AppKeys,
        refresh_token: String,
    ) -> BoxFuture<'_, ProviderResult<TokenResponse>> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock().unwrap() = Some(refresh_token);
        if let Some(ref hook) = self.on_refresh {
            hook();
        }
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let response = self.answer()?;
            Ok(match self.rotated_refresh_token {
                Some(ref token) => response.with_refresh_token(token.clone()),
                None => response,
            })
        })
    }

    fn exchange_code(
        &self,
        _provider: ProviderId,
        _keys: AppKeys,
        _code: String,
        _redirect_uri: String,
        _verifier: Option<String>,
    ) -> BoxFuture<'_, ProviderResult<TokenResponse>> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            self.answer()
                .map(|r| r.with_refresh_token(format!("{}-refresh", self.access_token)))
        })
    }

    fn page_tokens(&self, _user_token: String) -> BoxFuture<'_, ProviderResult<Vec<PageToken>>> {
        let pages = self.pages.clone();
        Box::pin(async move { Ok(pages) })
    }
}
