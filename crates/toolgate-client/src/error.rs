//! Client error types.

use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Settings could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] toolgate_core::CoreError),

    /// Credential resolution, refresh or consent failed.
    #[error("{0}")]
    Provider(#[from] toolgate_providers::ProviderError),

    /// Output could not be serialised.
    #[error("failed to serialize output: {0}")]
    Serialize(String),

    /// Action failed (open browser, etc).
    #[error("action failed: {0}")]
    Action(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

impl From<toml::ser::Error> for ClientError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}
