//! Process-level settings.
//!
//! Settings come from three layers, highest priority first:
//!
//! 1. explicit values (e.g. the CLI `--config-dir` flag)
//! 2. environment variables (`MCP_CONFIG_DIR`, `OAUTH_PORT`)
//! 3. an optional `config.toml` inside the config directory
//!
//! The config directory is also the root of every credential and key file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::env::EnvSource;
use crate::error::{CoreError, CoreResult};

/// Optional contents of `config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    oauth_port: Option<u16>,
    http_timeout_secs: Option<u64>,
    expiry_skew_secs: Option<u64>,
}

/// Resolved settings for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root directory for credential and key files.
    pub config_dir: PathBuf,

    /// Port the interactive consent callback listens on.
    pub oauth_port: u16,

    /// Timeout for token endpoint and upstream API requests.
    pub http_timeout: Duration,

    /// Tokens expiring within this window are treated as expired.
    pub expiry_skew: Duration,
}

impl Settings {
    /// Environment variable naming the config directory.
    pub const CONFIG_DIR_VAR: &'static str = "MCP_CONFIG_DIR";

    /// Environment variable naming the consent callback port.
    pub const OAUTH_PORT_VAR: &'static str = "OAUTH_PORT";

    /// Default consent callback port.
    pub const DEFAULT_OAUTH_PORT: u16 = 3000;

    /// Default HTTP timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default expiry skew in seconds.
    pub const DEFAULT_EXPIRY_SKEW_SECS: u64 = 60;

    /// Name of the optional settings file inside the config directory.
    pub const FILE_NAME: &'static str = "config.toml";

    /// Creates settings rooted at `config_dir` with default values.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            oauth_port: Self::DEFAULT_OAUTH_PORT,
            http_timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            expiry_skew: Duration::from_secs(Self::DEFAULT_EXPIRY_SKEW_SECS),
        }
    }

    /// Loads settings from the environment and the optional settings file.
    pub fn load(env: &dyn EnvSource) -> CoreResult<Self> {
        Self::load_with_dir(None, env)
    }

    /// Loads settings, using `config_dir` in preference to `MCP_CONFIG_DIR`.
    pub fn load_with_dir(config_dir: Option<PathBuf>, env: &dyn EnvSource) -> CoreResult<Self> {
        let config_dir = config_dir
            .or_else(|| env.var(Self::CONFIG_DIR_VAR).map(PathBuf::from))
            .unwrap_or_else(Self::default_config_dir);

        let mut settings = Self::new(config_dir);
        settings.apply_file()?;

        if let Some(raw) = env.var(Self::OAUTH_PORT_VAR) {
            settings.oauth_port = raw
                .trim()
                .parse()
                .map_err(|_| CoreError::invalid_value(Self::OAUTH_PORT_VAR, raw))?;
        }

        debug!(
            config_dir = %settings.config_dir.display(),
            oauth_port = settings.oauth_port,
            "settings loaded"
        );
        Ok(settings)
    }

    fn apply_file(&mut self) -> CoreResult<()> {
        let path = self.config_file();
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| CoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: SettingsFile = toml::from_str(&content).map_err(|source| CoreError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        if let Some(port) = file.oauth_port {
            self.oauth_port = port;
        }
        if let Some(secs) = file.http_timeout_secs {
            self.http_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.expiry_skew_secs {
            self.expiry_skew = Duration::from_secs(secs);
        }
        Ok(())
    }

    /// Returns the default config directory, `~/.toolgate`.
    pub fn default_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".toolgate")
    }

    /// Path of the optional settings file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(Self::FILE_NAME)
    }

    /// Returns the config directory.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Redirect URI registered for the consent callback.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/oauth2callback", self.oauth_port)
    }

    /// Builder: set the consent callback port.
    pub fn with_oauth_port(mut self, port: u16) -> Self {
        self.oauth_port = port;
        self
    }

    /// Builder: set the HTTP timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Builder: set the expiry skew.
    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.expiry_skew = skew;
        self
    }
}
