//! toolgate CLI entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use toolgate_core::{EnvSource, ProcessEnv, Settings, TracingConfig, init_tracing};
use toolgate_providers::ToolContext;

use toolgate_client::cli::{AuthAction, Cli, Command, ConfigAction};
use toolgate_client::commands;
use toolgate_client::error::ClientResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(TracingConfig::for_cli(cli.debug, cli.log_format)) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let env: Arc<dyn EnvSource> = Arc::new(ProcessEnv);
    let settings = Settings::load_with_dir(cli.config_dir, env.as_ref())?;
    let ctx = ToolContext::new(settings, env)?;

    match cli.command {
        Command::Status { json } => commands::status::run(&ctx, json),
        Command::Refresh { provider, force } => commands::refresh::run(&ctx, provider, force).await,
        Command::Auth { action } => match action {
            AuthAction::Url { provider, open } => commands::auth::url(&ctx, provider, open),
            AuthAction::Complete {
                provider,
                code,
                verifier,
            } => commands::auth::complete(&ctx, provider, &code, verifier.as_deref()).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(ctx.settings()),
            ConfigAction::Validate => commands::config::validate(&ctx),
            ConfigAction::Path => commands::config::path(&ctx),
        },
    }
}
