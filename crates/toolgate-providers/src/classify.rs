//! Classification of upstream failures.
//!
//! Status codes decide first; message markers catch failures that carry no
//! status, such as errors raised inside a tool operation.

use toolgate_core::ApiFamily;

use crate::client::UpstreamError;
use crate::error::ProviderError;
use crate::provider::reauth_error;

const SCOPE_MARKERS: &[&str] = &[
    "insufficient_scope",
    "insufficient permission",
    "insufficientpermissions",
    "insufficient authentication scopes",
    "access_token_scope_insufficient",
];

const AUTH_MARKERS: &[&str] = &[
    "invalid_grant",
    "invalid_token",
    "token expired",
    "token has been expired",
    "invalid_client",
    "unauthorized_client",
    "invalid credentials",
    "error validating access token",
];

const RATE_MARKERS: &[&str] = &["ratelimitexceeded", "rate limit", "quota exceeded"];

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| haystack.contains(m))
}

/// Maps an upstream failure of a `family` call to a classified error.
pub fn classify(family: ApiFamily, error: &UpstreamError) -> ProviderError {
    let provider = family.provider();
    let text = error.to_string().to_ascii_lowercase();
    let status = error.status();

    if status == Some(401) {
        return reauth_error(provider, "access token rejected with HTTP 401");
    }
    if contains_any(&text, SCOPE_MARKERS) {
        return permission_error(family);
    }
    if status == Some(429) || (status == Some(403) && contains_any(&text, RATE_MARKERS)) {
        return ProviderError::rate_limited(format!(
            "{} rate limit exceeded: {}",
            family.as_str(),
            error
        ))
        .with_provider(provider.as_str());
    }
    if status == Some(403) {
        return reauth_error(provider, "access denied with HTTP 403");
    }
    if contains_any(&text, AUTH_MARKERS) {
        return reauth_error(provider, &error.to_string());
    }
    let classified = match error {
        UpstreamError::Transport(_) => ProviderError::network(error.to_string()),
        UpstreamError::Decode(_) => ProviderError::invalid_response(error.to_string()),
        _ => ProviderError::operation(error.to_string()),
    };
    classified.with_provider(provider.as_str())
}

fn permission_error(family: ApiFamily) -> ProviderError {
    let provider = family.provider();
    ProviderError::permission(format!(
        "{} permission denied: the access token is missing a required scope. \
         Approve these scopes for the app in the {} developer console: {}; \
         then run `{}`",
        family.as_str(),
        provider.display_name(),
        family.required_scopes().join(", "),
        provider.auth_command()
    ))
    .with_provider(provider.as_str())
}
