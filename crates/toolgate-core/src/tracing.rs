//! Log output for toolgate.
//!
//! Everything is written to stderr. When toolgate runs behind a
//! tool-invocation host, stdout carries the protocol stream.
//!
//! ```ignore
//! use toolgate_core::{LogFormat, TracingConfig, init_tracing};
//!
//! init_tracing(TracingConfig::for_cli(false, LogFormat::Json))?;
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, prelude::*};

use crate::error::CoreError;

/// Crates whose events pass the default filter.
const CRATES: [&str; 3] = ["toolgate", "toolgate_core", "toolgate_providers"];

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Shape of each log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One human-readable line per event.
    #[default]
    Compact,
    /// One JSON object per event, for hosts that collect structured logs.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(CoreError::invalid_value("log format", s)),
        }
    }
}

/// What to log and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level for toolgate's own crates when `RUST_LOG` is unset.
    pub level: Level,
    pub format: LogFormat,
    /// Adds source file, line and module path to every event.
    pub with_location: bool,
    /// Filter directive used instead of `RUST_LOG` and `level`.
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            with_location: false,
            filter: None,
        }
    }
}

impl TracingConfig {
    /// Settings for the operator CLI. `debug` lowers the level to DEBUG and
    /// adds source locations.
    #[must_use]
    pub fn for_cli(debug: bool, format: LogFormat) -> Self {
        if debug {
            Self {
                level: Level::DEBUG,
                format,
                with_location: true,
                filter: None,
            }
        } else {
            Self {
                format,
                ..Self::default()
            }
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(ref filter) = self.filter {
            return Ok(EnvFilter::try_new(filter)?);
        }
        Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let directives: Vec<String> = CRATES
                .iter()
                .map(|name| format!("{}={}", name, self.level))
                .collect();
            EnvFilter::new(directives.join(","))
        }))
    }
}

/// Installs the global subscriber. Call once, before any event is emitted.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the filter does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;
    let base = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(config.with_location)
        .with_line_number(config.with_location)
        .with_target(config.with_location);

    let output = match config.format {
        LogFormat::Compact if config.with_location => base.compact().without_time().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base.json().boxed(),
    };

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(filter).with(output))?;
    Ok(())
}
