//! Interactive consent: authorization URLs and code completion.
//!
//! The callback listener that receives the authorization code lives outside
//! this crate. Its only contract with the credential layer is
//! [`complete_consent`]: exchange the code and write the provider's
//! credentials record.
//!
//! Google uses PKCE (RFC 7636) with offline access so that a refresh token is
//! issued. LinkedIn and Facebook use the plain authorization code grant with
//! a `state` parameter.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use toolgate_core::ProviderId;
use tracing::{debug, info, warn};

use crate::credentials::CredentialField;
use crate::error::{ProviderError, ProviderResult};
use crate::oauth::{PageToken, TokenEndpoint};
use crate::resolver::CredentialResolver;
use crate::store::{AppKeys, PersistedCredentials};
use crate::tokens::apply_token_response;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const LINKEDIN_AUTH_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
const FACEBOOK_DIALOG_URL: &str = "https://www.facebook.com/v19.0/dialog/oauth";

/// Length of the code verifier in random bytes.
const CODE_VERIFIER_LENGTH: usize = 32;

/// PKCE verifier, challenge and CSRF state for one consent attempt.
#[derive(Debug, Clone)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 hash of verifier, base64url encoded).
    pub challenge: String,
    /// Random state for CSRF protection.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    /// Computes the S256 challenge for a code verifier.
    pub fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Builds the consent URL for `provider`.
pub fn authorization_url(
    provider: ProviderId,
    keys: &AppKeys,
    redirect_uri: &str,
    pkce: &PkceFlow,
) -> String {
    let scopes = provider.consent_scopes();
    match provider {
        ProviderId::Google => format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
             code_challenge={}&code_challenge_method=S256&state={}&\
             access_type=offline&prompt=consent",
            GOOGLE_AUTH_URL,
            urlencoding::encode(&keys.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(&pkce.challenge),
            urlencoding::encode(&pkce.state),
        ),
        ProviderId::LinkedIn => format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&state={}&scope={}",
            LINKEDIN_AUTH_URL,
            urlencoding::encode(&keys.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&pkce.state),
            urlencoding::encode(&scopes.join(" ")),
        ),
        ProviderId::Facebook => format!(
            "{}?client_id={}&redirect_uri={}&state={}&response_type=code&scope={}",
            FACEBOOK_DIALOG_URL,
            urlencoding::encode(&keys.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&pkce.state),
            urlencoding::encode(&scopes.join(",")),
        ),
    }
}

/// Returns the OAuth application keys for `provider`, or a configuration
/// error naming where to put them.
pub fn require_app_keys(
    resolver: &CredentialResolver,
    provider: ProviderId,
) -> ProviderResult<AppKeys> {
    resolver.app_keys(provider)?.ok_or_else(|| {
        ProviderError::configuration(format!(
            "no OAuth app keys for {}: set {} and {} or write {}",
            provider.display_name(),
            provider.env_var(CredentialField::ClientId.env_suffix()),
            provider.env_var(CredentialField::ClientSecret.env_suffix()),
            resolver.store().keys_path(provider).display()
        ))
        .with_provider(provider.as_str())
    })
}

/// Exchanges an authorization code and persists the resulting record.
///
/// The app keys used for the exchange are written to the keys file as well,
/// so the stored record can be refreshed from files alone.
///
/// For Facebook the user token is traded for a page token: the page named
/// by `FACEBOOK_PAGE_ID` if set, otherwise the first page the user manages.
pub async fn complete_consent(
    resolver: &CredentialResolver,
    endpoint: &dyn TokenEndpoint,
    provider: ProviderId,
    code: &str,
    redirect_uri: &str,
    verifier: Option<&str>,
) -> ProviderResult<PersistedCredentials> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ProviderError::configuration("authorization code is empty")
            .with_provider(provider.as_str()));
    }

    let keys = require_app_keys(resolver, provider)?;

    debug!(provider = %provider, "exchanging authorization code");
    let response = endpoint
        .exchange_code(
            provider,
            keys.clone(),
            code.to_string(),
            redirect_uri.to_string(),
            verifier.map(str::to_string),
        )
        .await?;

    let mut record = PersistedCredentials::default();
    apply_token_response(&mut record, &response, Utc::now());

    if provider == ProviderId::Facebook {
        let pages = endpoint.page_tokens(response.access_token.clone()).await?;
        let hint = resolver.env_field(provider, CredentialField::PageId);
        let page = select_page(pages, hint.as_deref())?;
        debug!(page_id = %page.id, page_name = ?page.name, "selected facebook page");
        record.page_access_token = Some(page.access_token);
        record.page_id = Some(page.id);
    }

    let store = resolver.store();
    store.write_credentials(provider, &record)?;
    if store.read_keys(provider).ok().flatten().as_ref() != Some(&keys) {
        store.write_keys(provider, &keys)?;
        debug!(provider = %provider, "app keys saved alongside credentials");
    }
    info!(
        provider = %provider,
        path = %resolver.store().credentials_path(provider).display(),
        "consent completed, credentials saved"
    );
    Ok(record)
}

fn select_page(pages: Vec<PageToken>, wanted: Option<&str>) -> ProviderResult<PageToken> {
    let available: Vec<String> = pages.iter().map(|p| p.id.clone()).collect();
    let page = match wanted {
        Some(id) => pages.into_iter().find(|p| p.id == id),
        None => pages.into_iter().next(),
    };
    page.ok_or_else(|| {
        let message = match wanted {
            Some(id) => format!(
                "facebook page {} is not managed by this account (available: {})",
                id,
                available.join(", ")
            ),
            None => "this facebook account manages no pages".to_string(),
        };
        warn!("{}", message);
        ProviderError::configuration(message).with_provider(ProviderId::Facebook.as_str())
    })
}
