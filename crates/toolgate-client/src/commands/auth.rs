//! Authentication commands.
//!
//! `toolgate auth url` prints the consent URL; the operator approves access
//! in a browser and passes the code from the redirect to
//! `toolgate auth complete`.

use toolgate_core::ProviderId;
use toolgate_providers::{AppKeys, PkceFlow, ToolContext, authorization_url, require_app_keys};
use tracing::info;

use crate::error::{ClientError, ClientResult};

/// Print (and optionally open) the consent URL for `provider`.
pub fn url(ctx: &ToolContext, provider: ProviderId, open: bool) -> ClientResult<()> {
    let keys = app_keys(ctx, provider)?;
    let pkce = PkceFlow::new();
    let url = authorization_url(provider, &keys, &ctx.settings().redirect_uri(), &pkce);

    println!("Open this URL in your browser to authorize {}:", provider.display_name());
    println!();
    println!("{}", url);
    println!();
    println!("Then run:");
    println!("  {}", complete_hint(provider, &pkce));

    if open {
        open::that(&url).map_err(|e| ClientError::Action(format!("failed to open browser: {}", e)))?;
    }
    Ok(())
}

/// Exchange an authorization code and save the provider's credentials.
pub async fn complete(
    ctx: &ToolContext,
    provider: ProviderId,
    code: &str,
    verifier: Option<&str>,
) -> ClientResult<()> {
    let record = ctx.complete_consent(provider, code, verifier).await?;
    info!(provider = %provider, "consent completed");

    println!("Authentication successful!");
    println!(
        "{} credentials saved to {}",
        provider.display_name(),
        ctx.store().credentials_path(provider).display()
    );
    if let Some(ref page_id) = record.page_id {
        println!("Using Facebook page {}", page_id);
    }
    Ok(())
}

fn app_keys(ctx: &ToolContext, provider: ProviderId) -> ClientResult<AppKeys> {
    Ok(require_app_keys(ctx.resolver(), provider)?)
}

fn complete_hint(provider: ProviderId, pkce: &PkceFlow) -> String {
    match provider {
        ProviderId::Google => format!(
            "toolgate auth complete google --code <CODE> --verifier {}",
            pkce.verifier
        ),
        _ => format!("toolgate auth complete {} --code <CODE>", provider.as_str()),
    }
}
