//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use toolgate_core::{LogFormat, ProviderId};

/// toolgate - OAuth credentials for Gmail, Calendar, LinkedIn and Facebook tools
#[derive(Debug, Parser)]
#[command(name = "toolgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding credential and key files
    #[arg(long, global = true, env = "MCP_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Log line format on stderr (compact, json)
    #[arg(long, global = true, env = "TOOLGATE_LOG_FORMAT", default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show where each provider's credentials resolve from and whether the
    /// token is usable
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Refresh a provider's access token
    Refresh {
        /// Provider to refresh (google, linkedin, facebook)
        provider: ProviderId,

        /// Refresh even if the current token is still valid
        #[arg(long, short)]
        force: bool,
    },

    /// Authentication commands
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Interactive consent steps.
#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Print the consent URL for a provider
    Url {
        /// Provider to authorize (google, linkedin, facebook)
        provider: ProviderId,

        /// Open the URL in the default browser
        #[arg(long)]
        open: bool,
    },

    /// Exchange an authorization code and save the credentials
    Complete {
        /// Provider the code was issued by
        provider: ProviderId,

        /// Authorization code from the consent redirect
        #[arg(long)]
        code: String,

        /// PKCE verifier printed by `toolgate auth url`
        #[arg(long)]
        verifier: Option<String>,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective settings
    Dump,

    /// Check that credential and key files parse
    Validate,

    /// Show the configuration directory and file paths
    Path,
}
