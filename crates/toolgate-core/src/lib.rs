//! Core types: providers, API families, settings, environment, tracing
//!
//! This crate holds the identifiers and process-level configuration shared by
//! the credential layer (`toolgate-providers`) and the operator CLI.

pub mod env;
pub mod error;
pub mod provider;
pub mod settings;
pub mod tracing;

pub use env::{EnvSource, ProcessEnv};
pub use error::{CoreError, CoreResult};
pub use provider::{ApiFamily, ProviderId, TokenFlow};
pub use settings::Settings;
pub use self::tracing::{LogFormat, TracingConfig, TracingError, init_tracing};
