//! File-backed credential store.
//!
//! Each provider owns two JSON files in the config directory: the
//! application keys (`gcp-oauth.keys.json`, ...) written once by the
//! operator, and the user credentials (`google-credentials.json`, ...)
//! written by consent and by every successful refresh.
//!
//! Writes go to a uniquely named temporary file in the same directory and
//! are renamed over the target, so a reader never sees a half-written
//! record.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use toolgate_core::ProviderId;

use crate::error::{ProviderError, ProviderResult};

/// A user's current tokens for one provider, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Lifetime in seconds reported by the token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Absolute expiry, milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Facebook page-scoped token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,

    /// Digest of the refresh token, supplied from outside this file, that
    /// the record descends from. Survives refresh-token rotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_origin: Option<String>,

    /// Fields we do not interpret, carried through rewrites untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PersistedCredentials {
    /// Returns the expiry as a timestamp, if recorded.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry_date
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Returns the granted scopes.
    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }
}

/// The registered application's OAuth client ID and secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppKeys {
    pub client_id: String,
    pub client_secret: String,
}

/// On-disk layout of a keys file.
///
/// Accepts the Google Cloud Console download (`installed` or `web` section)
/// and a flat `client_id`/`client_secret` object.
#[derive(Debug, Deserialize)]
struct KeysFile {
    installed: Option<NestedKeys>,
    web: Option<NestedKeys>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedKeys {
    client_id: String,
    client_secret: String,
}

impl AppKeys {
    /// Creates new application keys.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Parses keys from any supported JSON layout.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: KeysFile =
            serde_json::from_str(json).map_err(|e| format!("failed to parse keys JSON: {}", e))?;

        if let Some(keys) = file.installed.or(file.web) {
            return Ok(Self::new(keys.client_id, keys.client_secret));
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err("keys file must contain an 'installed'/'web' section or 'client_id'/'client_secret' at root level".to_string())
    }
}

/// Reads and writes credential files under one config directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the user credentials file for `provider`.
    pub fn credentials_path(&self, provider: ProviderId) -> PathBuf {
        self.dir.join(provider.credentials_file_name())
    }

    /// Path of the application keys file for `provider`.
    pub fn keys_path(&self, provider: ProviderId) -> PathBuf {
        self.dir.join(provider.keys_file_name())
    }

    /// Reads the persisted credentials for `provider`.
    ///
    /// Returns `Ok(None)` if the file does not exist and
    /// `CorruptCredentials` if it is not a valid record.
    pub fn read_credentials(
        &self,
        provider: ProviderId,
    ) -> ProviderResult<Option<PersistedCredentials>> {
        let path = self.credentials_path(provider);
        let Some(content) = read_optional(&path, provider)? else {
            return Ok(None);
        };
        parse_json::<PersistedCredentials>(&content, &path, provider).map(Some)
    }

    /// Overwrites the persisted credentials for `provider`.
    pub fn write_credentials(
        &self,
        provider: ProviderId,
        record: &PersistedCredentials,
    ) -> ProviderResult<()> {
        let path = self.credentials_path(provider);
        write_json(&path, record, provider)?;
        info!(provider = %provider, path = %path.display(), "credentials written");
        Ok(())
    }

    /// Reads the application keys for `provider`.
    pub fn read_keys(&self, provider: ProviderId) -> ProviderResult<Option<AppKeys>> {
        let path = self.keys_path(provider);
        let Some(content) = read_optional(&path, provider)? else {
            return Ok(None);
        };
        AppKeys::from_json(&content).map(Some).map_err(|e| {
            ProviderError::corrupt(format!("{}: {}", path.display(), e))
                .with_provider(provider.as_str())
        })
    }

    /// Writes the application keys for `provider` in the flat layout.
    pub fn write_keys(&self, provider: ProviderId, keys: &AppKeys) -> ProviderResult<()> {
        let path = self.keys_path(provider);
        write_json(&path, keys, provider)?;
        info!(provider = %provider, path = %path.display(), "application keys written");
        Ok(())
    }
}

fn read_optional(path: &Path, provider: ProviderId) -> ProviderResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            debug!(path = %path.display(), "read credential file");
            Ok(Some(content))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no credential file");
            Ok(None)
        }
        Err(e) => Err(ProviderError::storage(format!(
            "failed to read {}: {}",
            path.display(),
            e
        ))
        .with_provider(provider.as_str())
        .with_source(e)),
    }
}

fn parse_json<T: DeserializeOwned>(
    content: &str,
    path: &Path,
    provider: ProviderId,
) -> ProviderResult<T> {
    serde_json::from_str(content).map_err(|e| {
        ProviderError::corrupt(format!("{} is not valid JSON: {}", path.display(), e))
            .with_provider(provider.as_str())
            .with_source(e)
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T, provider: ProviderId) -> ProviderResult<()> {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let storage_err = |what: &str, e: io::Error| {
        ProviderError::storage(format!("failed to {} {}: {}", what, path.display(), e))
            .with_provider(provider.as_str())
            .with_source(e)
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| storage_err("create directory for", e))?;
    }

    let content = serde_json::to_string_pretty(value).map_err(|e| {
        ProviderError::storage(format!("failed to serialize {}: {}", path.display(), e))
            .with_provider(provider.as_str())
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| provider.credentials_file_name().to_string());
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_path = path.with_file_name(format!("{}.{}.{}.tmp", file_name, std::process::id(), seq));

    fs::write(&tmp_path, content).map_err(|e| storage_err("write", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(storage_err("replace", e));
    }
    Ok(())
}
