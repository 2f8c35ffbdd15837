//! Provider and API family identifiers.
//!
//! A [`ProviderId`] names an OAuth identity provider and owns the naming
//! conventions for its environment variables and on-disk files. An
//! [`ApiFamily`] is a group of tools served by one provider; Gmail and
//! Calendar share the Google credentials.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// How a provider keeps its access token usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenFlow {
    /// Short-lived access token renewed from a refresh token.
    RefreshToken,
    /// Long-lived access token used as-is until the upstream rejects it.
    StaticToken,
}

/// An OAuth identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Google,
    #[serde(rename = "linkedin")]
    LinkedIn,
    Facebook,
}

impl ProviderId {
    /// All providers, in display order.
    pub const ALL: [ProviderId; 3] = [Self::Google, Self::LinkedIn, Self::Facebook];

    /// Returns the lowercase name used in commands and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::LinkedIn => "linkedin",
            Self::Facebook => "facebook",
        }
    }

    /// Returns the human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::LinkedIn => "LinkedIn",
            Self::Facebook => "Facebook",
        }
    }

    /// Returns the prefix of this provider's environment variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Google => "GOOGLE",
            Self::LinkedIn => "LINKEDIN",
            Self::Facebook => "FACEBOOK",
        }
    }

    /// Returns the full environment variable name for `field`,
    /// e.g. `GOOGLE_CLIENT_ID` for `CLIENT_ID`.
    pub fn env_var(&self, field: &str) -> String {
        format!("{}_{}", self.env_prefix(), field)
    }

    /// File name of the OAuth application keys record.
    pub fn keys_file_name(&self) -> &'static str {
        match self {
            Self::Google => "gcp-oauth.keys.json",
            Self::LinkedIn => "linkedin-oauth.keys.json",
            Self::Facebook => "facebook-oauth.keys.json",
        }
    }

    /// File name of the persisted user credentials record.
    pub fn credentials_file_name(&self) -> &'static str {
        match self {
            Self::Google => "google-credentials.json",
            Self::LinkedIn => "linkedin-credentials.json",
            Self::Facebook => "facebook-credentials.json",
        }
    }

    /// Returns how this provider keeps access tokens fresh.
    pub fn token_flow(&self) -> TokenFlow {
        match self {
            Self::Google => TokenFlow::RefreshToken,
            Self::LinkedIn | Self::Facebook => TokenFlow::StaticToken,
        }
    }

    /// The command an operator runs to redo interactive consent.
    pub fn auth_command(&self) -> String {
        format!("toolgate auth url {}", self.as_str())
    }

    /// API families served by this provider.
    pub fn families(&self) -> &'static [ApiFamily] {
        match self {
            Self::Google => &[ApiFamily::Gmail, ApiFamily::Calendar],
            Self::LinkedIn => &[ApiFamily::LinkedIn],
            Self::Facebook => &[ApiFamily::Facebook],
        }
    }

    /// Scopes requested during interactive consent: the union of the
    /// scopes every family of this provider needs.
    pub fn consent_scopes(&self) -> Vec<&'static str> {
        let mut scopes = Vec::new();
        for family in self.families() {
            for scope in family.required_scopes() {
                if !scopes.contains(scope) {
                    scopes.push(*scope);
                }
            }
        }
        scopes
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gmail" | "calendar" => Ok(Self::Google),
            "linkedin" => Ok(Self::LinkedIn),
            "facebook" => Ok(Self::Facebook),
            _ => Err(CoreError::UnknownProvider(s.to_string())),
        }
    }
}

/// A family of tools backed by one upstream REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFamily {
    Gmail,
    Calendar,
    #[serde(rename = "linkedin")]
    LinkedIn,
    Facebook,
}

impl ApiFamily {
    /// All families.
    pub const ALL: [ApiFamily; 4] = [Self::Gmail, Self::Calendar, Self::LinkedIn, Self::Facebook];

    /// Returns the lowercase family name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Calendar => "calendar",
            Self::LinkedIn => "linkedin",
            Self::Facebook => "facebook",
        }
    }

    /// The provider whose credentials this family uses.
    pub fn provider(&self) -> ProviderId {
        match self {
            Self::Gmail | Self::Calendar => ProviderId::Google,
            Self::LinkedIn => ProviderId::LinkedIn,
            Self::Facebook => ProviderId::Facebook,
        }
    }

    /// Base URL of the upstream REST API.
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Gmail => "https://gmail.googleapis.com/gmail/v1",
            Self::Calendar => "https://www.googleapis.com/calendar/v3",
            Self::LinkedIn => "https://api.linkedin.com/v2",
            Self::Facebook => "https://graph.facebook.com/v19.0",
        }
    }

    /// OAuth scopes the family's tools need.
    pub fn required_scopes(&self) -> &'static [&'static str] {
        match self {
            Self::Gmail => &[
                "https://www.googleapis.com/auth/gmail.modify",
                "https://www.googleapis.com/auth/gmail.send",
            ],
            Self::Calendar => &["https://www.googleapis.com/auth/calendar"],
            Self::LinkedIn => &["openid", "profile", "email", "w_member_social"],
            Self::Facebook => &[
                "pages_show_list",
                "pages_read_engagement",
                "pages_manage_posts",
            ],
        }
    }
}

impl fmt::Display for ApiFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiFamily {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gmail" => Ok(Self::Gmail),
            "calendar" => Ok(Self::Calendar),
            "linkedin" => Ok(Self::LinkedIn),
            "facebook" => Ok(Self::Facebook),
            _ => Err(CoreError::UnknownFamily(s.to_string())),
        }
    }
}
