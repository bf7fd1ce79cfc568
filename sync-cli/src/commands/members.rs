//! List project members and whether each holds the key.

use anyhow::Result;
use envsync_client::{fingerprint, Relay};
use envsync_types::Member;

use crate::commands::{explain, open_client, Ctx};

/// Run the members command.
pub async fn run<R: Relay>(ctx: &Ctx, relay: R) -> Result<Vec<Member>> {
    let (client, _) = open_client(ctx, relay).await?;
    let members = client.members().await.map_err(explain)?;

    println!("Members of {}:", client.project());
    for member in &members {
        let status = if member.has_key { "key shared" } else { "pending" };
        let print = member
            .public_key
            .as_ref()
            .map(fingerprint)
            .unwrap_or_else(|| "no identity".to_string());
        println!("  {:<32} {:<10}  {}", member.email, status, print);
    }
    Ok(members)
}
