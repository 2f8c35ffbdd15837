//! Core error types.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while parsing identifiers or loading settings.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Provider name not recognised.
    #[error("unknown provider: {0} (expected google, linkedin or facebook)")]
    UnknownProvider(String),

    /// API family name not recognised.
    #[error("unknown API family: {0} (expected gmail, calendar, linkedin or facebook)")]
    UnknownFamily(String),

    /// A setting had a value that could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },

    /// The settings file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl CoreError {
    /// Creates an invalid value error.
    pub fn invalid_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            value: value.into(),
        }
    }
}
