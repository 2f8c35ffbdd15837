//! Configuration commands.

use serde::Serialize;
use toolgate_core::{ProviderId, Settings};
use toolgate_providers::ToolContext;

use crate::error::ClientResult;

/// Effective settings, as written by `config dump`.
#[derive(Debug, Serialize)]
struct SettingsDump {
    config_dir: String,
    oauth_port: u16,
    redirect_uri: String,
    http_timeout_secs: u64,
    expiry_skew_secs: u64,
}

impl From<&Settings> for SettingsDump {
    fn from(settings: &Settings) -> Self {
        Self {
            config_dir: settings.config_dir.display().to_string(),
            oauth_port: settings.oauth_port,
            redirect_uri: settings.redirect_uri(),
            http_timeout_secs: settings.http_timeout.as_secs(),
            expiry_skew_secs: settings.expiry_skew.as_secs(),
        }
    }
}

/// Dump the effective settings to stdout.
pub fn dump(settings: &Settings) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(&SettingsDump::from(settings))?;
    println!("# {}", settings.config_file().display());
    println!("{}", toml_str);
    Ok(())
}

/// Check that every present key and credentials file parses.
pub fn validate(ctx: &ToolContext) -> ClientResult<()> {
    let store = ctx.store();
    for provider in ProviderId::ALL {
        store.read_keys(provider)?;
        store.read_credentials(provider)?;
        println!("{}: files ok", provider.as_str());
    }
    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration directory and per-provider file paths.
pub fn path(ctx: &ToolContext) -> ClientResult<()> {
    println!("config: {}", ctx.settings().config_file().display());
    for provider in ProviderId::ALL {
        println!("{} keys: {}", provider.as_str(), ctx.store().keys_path(provider).display());
        println!(
            "{} credentials: {}",
            provider.as_str(),
            ctx.store().credentials_path(provider).display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use toolgate_core::EnvSource;

    #[test]
    fn dump_uses_whole_seconds() {
        let settings = Settings::new("/tmp/tg")
            .with_oauth_port(4000)
            .with_expiry_skew(Duration::from_secs(90));
        let dump = toml::to_string_pretty(&SettingsDump::from(&settings)).unwrap();
        assert!(dump.contains("oauth_port = 4000"));
        assert!(dump.contains("redirect_uri = \"http://localhost:4000/oauth2callback\""));
        assert!(dump.contains("http_timeout_secs = 30"));
        assert!(dump.contains("expiry_skew_secs = 90"));
    }

    #[test]
    fn validate_reports_corrupt_files() {
        let tmp = tempfile::tempdir().unwrap();
        let env: Arc<dyn EnvSource> = Arc::new(HashMap::<String, String>::new());
        let ctx = ToolContext::new(Settings::new(tmp.path()), env).unwrap();
        assert!(validate(&ctx).is_ok());

        std::fs::write(ctx.store().credentials_path(ProviderId::LinkedIn), "{oops").unwrap();
        let err = validate(&ctx).unwrap_err();
        assert!(err.to_string().contains("linkedin"));
    }
}
