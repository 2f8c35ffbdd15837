//! Status command.

use std::fmt::Write as _;

use toolgate_core::ProviderId;
use toolgate_providers::{CredentialStatus, ToolContext};

use crate::error::ClientResult;

/// Print the credential status of every provider. Never refreshes.
pub fn run(ctx: &ToolContext, json: bool) -> ClientResult<()> {
    let statuses = collect(ctx);
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        print!("{}", render(&statuses));
    }
    Ok(())
}

fn collect(ctx: &ToolContext) -> Vec<CredentialStatus> {
    ProviderId::ALL.iter().map(|id| ctx.status(*id)).collect()
}

fn render(statuses: &[CredentialStatus]) -> String {
    let mut out = String::new();
    for status in statuses {
        let source = status.source.map(|s| s.as_str()).unwrap_or("none");
        let _ = write!(
            out,
            "{:<9} source={:<11} token={}",
            status.provider.as_str(),
            source,
            status.state
        );
        if let Some(expires_at) = status.expires_at {
            let _ = write!(out, " expires={}", expires_at.to_rfc3339());
        }
        if let Some(ref detail) = status.detail {
            let _ = write!(out, " ({})", detail);
        }
        out.push('\n');
    }
    out
}
