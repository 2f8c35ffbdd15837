//! Environment variable lookup.
//!
//! Credential resolution reads `<PROVIDER>_*` variables through [`EnvSource`]
//! so that tests can supply a map instead of mutating the process environment.

use std::collections::HashMap;

/// A source of environment variables.
///
/// Empty or whitespace-only values are reported as unset.
pub trait EnvSource: Send + Sync {
    /// Returns the value of `key`, if set to something non-empty.
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        non_empty(std::env::var(key).ok())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        non_empty(self.get(key).cloned())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
