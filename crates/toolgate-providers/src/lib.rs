//! OAuth credential lifecycle for tool calls.
//!
//! This crate resolves, validates, refreshes and persists the credentials
//! behind every Gmail, Calendar, LinkedIn and Facebook tool call:
//!
//! - [`CredentialResolver`] - Merges call-time overrides, environment
//!   variables and credential files into one [`CredentialTuple`]
//! - [`CredentialStore`] - Per-provider JSON records, written atomically
//! - [`TokenRefresher`] - Expiry check and refresh-token exchange, serialised
//!   per provider
//! - [`CredentialProvider`] - Refresh-token and static-token strategies
//! - [`ToolContext`] - The invocation wrapper tool handlers call
//! - [`ToolResponse`] - The uniform success/failure envelope
//!
//! # Architecture
//!
//! ```text
//!   overrides ─┐
//!   env vars  ─┼─▶ CredentialResolver ─▶ CredentialTuple
//!   files     ─┘                              │
//!                                             ▼
//!                  CredentialProvider::authorize (refresh + persist)
//!                                             │
//!                                             ▼ AccessGrant
//!                       ClientCache ◀── ApiClient ──▶ tool operation
//!                                                          │
//!                                          classify() ◀────┘ on failure
//!                                             │
//!                                             ▼
//!                                        ToolResponse
//! ```
//!
//! # Example
//!
//! ```ignore
//! use toolgate_core::{ApiFamily, ProcessEnv, Settings};
//! use toolgate_providers::ToolContext;
//!
//! let settings = Settings::load(&ProcessEnv)?;
//! let ctx = ToolContext::new(settings, Arc::new(ProcessEnv))?;
//! let response = ctx
//!     .invoke(ApiFamily::Calendar, None, |client| async move {
//!         client.get_json::<serde_json::Value>("users/me/calendarList", &[]).await
//!     })
//!     .await;
//! println!("{}", response.to_value());
//! ```

pub mod cache;
pub mod classify;
pub mod client;
pub mod consent;
pub mod credentials;
pub mod envelope;
pub mod error;
pub mod invoke;
pub mod oauth;
pub mod provider;
pub mod refresh;
pub mod resolver;
pub mod store;
pub mod tokens;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use cache::ClientCache;
pub use classify::classify;
pub use client::{ApiClient, UpstreamError};
pub use consent::{PkceFlow, authorization_url, complete_consent, require_app_keys};
pub use credentials::{CallOverrides, CredentialField, CredentialSource, CredentialTuple};
pub use envelope::ToolResponse;
pub use error::{ErrorCategory, ProviderError, ProviderErrorCode, ProviderResult};
pub use invoke::{CredentialStatus, ToolContext};
pub use oauth::{EndpointUrls, HttpTokenEndpoint, PageToken, TokenEndpoint};
pub use provider::{
    AccessGrant, BoxFuture, CredentialProvider, RefreshTokenProvider, StaticTokenProvider,
    provider_for,
};
pub use refresh::TokenRefresher;
pub use resolver::CredentialResolver;
pub use store::{AppKeys, CredentialStore, PersistedCredentials};
pub use tokens::{TokenResponse, TokenState, apply_token_response, assess};
