//! Refresh command.

use toolgate_core::ProviderId;
use toolgate_providers::{AccessGrant, ToolContext};
use tracing::info;

use crate::error::ClientResult;

/// Validate a provider's default credentials, refreshing if stale or if
/// `force` is set.
pub async fn run(ctx: &ToolContext, provider: ProviderId, force: bool) -> ClientResult<()> {
    let grant = if force {
        ctx.refresh(provider).await?
    } else {
        ctx.validate(provider).await?
    };
    info!(provider = %provider, source = %grant.source, "credentials validated");
    println!("{}", describe(&grant));
    Ok(())
}

fn describe(grant: &AccessGrant) -> String {
    let mut line = format!(
        "{}: access token ok (source: {})",
        grant.provider.display_name(),
        grant.source
    );
    if let Some(expires_at) = grant.expires_at {
        line.push_str(&format!(", expires {}", expires_at.to_rfc3339()));
    }
    if let Some(ref page_id) = grant.page_id {
        line.push_str(&format!(", page {}", page_id));
    }
    line
}
