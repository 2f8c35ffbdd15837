//! Error types for credential and tool operations.
//!
//! Every failure inside this crate is a [`ProviderError`]. Its
//! [`ProviderErrorCode`] is fine-grained; [`ErrorCategory`] collapses the
//! codes into the four kinds reported to the tool-call host.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The kind of failure reported in a tool response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// No usable credentials could be resolved. Needs operator action.
    Configuration,
    /// Credentials exist but were rejected, expired or could not be refreshed.
    Authentication,
    /// Credentials are valid but lack a required scope.
    Permission,
    /// Anything else reported by the upstream API.
    Operation,
}

impl ErrorCategory {
    /// Returns the lowercase category name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Authentication => "authentication",
            Self::Permission => "permission",
            Self::Operation => "operation",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The code of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Missing or incomplete credentials, or an unusable setting.
    ConfigurationError,
    /// A credential or key file exists but is not valid JSON.
    CorruptCredentials,
    /// A credential file could not be read or written.
    StorageError,
    /// Credentials were rejected, expired, or refresh failed.
    AuthenticationFailed,
    /// The token lacks a scope the operation needs.
    PermissionDenied,
    /// Connection failed, timed out, DNS resolution, etc.
    NetworkError,
    /// Too many requests.
    RateLimited,
    /// The server answered with something we could not parse.
    InvalidResponse,
    /// The upstream API reported a failure.
    OperationFailed,
}

impl ProviderErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError | Self::RateLimited)
    }

    /// Returns the category reported to callers.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigurationError | Self::CorruptCredentials | Self::StorageError => {
                ErrorCategory::Configuration
            }
            Self::AuthenticationFailed => ErrorCategory::Authentication,
            Self::PermissionDenied => ErrorCategory::Permission,
            Self::NetworkError
            | Self::RateLimited
            | Self::InvalidResponse
            | Self::OperationFailed => ErrorCategory::Operation,
        }
    }

    /// Returns a machine-readable name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationError => "configuration_error",
            Self::CorruptCredentials => "corrupt_credentials",
            Self::StorageError => "storage_error",
            Self::AuthenticationFailed => "authentication_failed",
            Self::PermissionDenied => "permission_denied",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::InvalidResponse => "invalid_response",
            Self::OperationFailed => "operation_failed",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while resolving, validating or using credentials.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// The provider that generated this error (e.g. "google").
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    /// Creates a corrupt credentials error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::CorruptCredentials, message)
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::StorageError, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    /// Creates a permission error.
    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::PermissionDenied, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    /// Creates a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    /// Creates an operation error.
    pub fn operation(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::OperationFailed, message)
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    /// Returns the category reported to callers.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the provider name, if set.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
