//! Accept an invitation and link the current workspace.

use anyhow::Result;
use envsync_client::Relay;
use std::path::Path;

use crate::commands::link::{fetch_key, link_workspace};
use crate::commands::{explain, Ctx};
use crate::config::load_identity;

/// Run the join command.
pub async fn run<R: Relay>(ctx: &Ctx, relay: R, invitation_id: &str, env_file: &Path) -> Result<()> {
    // The relay can only share a key with a registered identity.
    let identity = load_identity(&ctx.data_dir).await?;
    relay
        .register_identity(&identity.public_key())
        .await
        .map_err(|e| explain(e.into()))?;

    let project = relay
        .accept_invitation(invitation_id)
        .await
        .map_err(|e| explain(e.into()))?;

    link_workspace(ctx, &project.id, env_file).await?;
    println!("Joined project '{}' ({})", project.name, project.id);
    fetch_key(ctx, relay).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{machine, project_owner};
    use crate::commands::{invite, pull, push};
    use crate::config::{load_project_key, require_link};
    use envsync_client::AutoConfirm;

    #[tokio::test]
    async fn join_then_receive_key_on_owner_push() {
        let owner = project_owner().await;
        owner.write_env("API_KEY=abc\n");
        push::run(&owner.ctx, owner.relay.clone(), push::PushArgs::default(), &AutoConfirm(true))
            .await
            .unwrap();

        let bob_relay = owner.relay.signup("bob@example.com");
        let id = invite::run(&owner.ctx, owner.relay.clone(), "bob@example.com")
            .await
            .unwrap();
        let bob = machine(bob_relay).await;
        run(&bob.ctx, bob.relay.clone(), &id, Path::new(".env"))
            .await
            .unwrap();

        let project = require_link(&bob.ctx.data_dir, &bob.ctx.workspace)
            .await
            .unwrap()
            .project_id;
        assert!(load_project_key(&bob.ctx.data_dir, &project)
            .await
            .unwrap()
            .is_none());

        // Owner's next push shares the key with the pending member.
        owner.write_env("API_KEY=def\n");
        push::run(&owner.ctx, owner.relay.clone(), push::PushArgs::default(), &AutoConfirm(true))
            .await
            .unwrap();

        pull::run(&bob.ctx, bob.relay.clone(), false).await.unwrap();
        assert_eq!(bob.read_env(), "API_KEY=def\n");
        assert!(load_project_key(&bob.ctx.data_dir, &project)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn registered_invitee_has_key_on_join() {
        let owner = project_owner().await;
        owner.write_env("API_KEY=abc\n");
        push::run(&owner.ctx, owner.relay.clone(), push::PushArgs::default(), &AutoConfirm(true))
            .await
            .unwrap();
        let bob = machine(owner.relay.signup("bob@example.com")).await;
        let id = invite::run(&owner.ctx, owner.relay.clone(), "bob@example.com")
            .await
            .unwrap();

        run(&bob.ctx, bob.relay.clone(), &id, Path::new(".env"))
            .await
            .unwrap();

        // Wrapped at invite time: no owner push needed.
        let project = require_link(&bob.ctx.data_dir, &bob.ctx.workspace)
            .await
            .unwrap()
            .project_id;
        assert!(load_project_key(&bob.ctx.data_dir, &project)
            .await
            .unwrap()
            .is_some());
        pull::run(&bob.ctx, bob.relay.clone(), false).await.unwrap();
        assert_eq!(bob.read_env(), "API_KEY=abc\n");
    }

    #[tokio::test]
    async fn unknown_invitation_fails() {
        let owner = project_owner().await;
        let bob = machine(owner.relay.signup("bob@example.com")).await;
        assert!(run(&bob.ctx, bob.relay.clone(), "nope", Path::new(".env"))
            .await
            .is_err());
    }
}
