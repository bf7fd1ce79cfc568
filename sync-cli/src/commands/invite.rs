//! Invite someone to the linked project.

use anyhow::Result;
use envsync_client::Relay;

use crate::commands::{explain, open_client, report_distribution, Ctx};

/// Run the invite command.
pub async fn run<R: Relay>(ctx: &Ctx, relay: R, email: &str) -> Result<String> {
    let (client, _) = open_client(ctx, relay).await?;
    let outcome = client.invite(email).await.map_err(explain)?;

    println!("Invited {} to project {}", email, client.project());
    println!();
    println!("  Invitation ID: {}", outcome.invitation.id);
    println!();
    println!("They can join with: envsync join {}", outcome.invitation.id);
    if outcome.shared_immediately {
        println!("  Project key already shared with them.");
    }
    report_distribution(&outcome.distribution);
    Ok(outcome.invitation.id)
}
