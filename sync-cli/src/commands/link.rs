//! Link the current workspace to an existing project.

use anyhow::Result;
use envsync_client::{ClientError, Relay};
use envsync_types::ProjectId;
use std::path::Path;

use crate::commands::{explain, open_client, Ctx};
use crate::config::{WorkspaceLink, WorkspaceState};

/// Run the link command.
pub async fn run<R: Relay>(ctx: &Ctx, relay: R, project: &ProjectId, env_file: &Path) -> Result<()> {
    // Confirms the project exists and we are a member.
    relay
        .env_version(project)
        .await
        .map_err(|e| explain(e.into()))?;

    link_workspace(ctx, project, env_file).await?;
    println!("Linked {} to project {}", ctx.workspace.display(), project);
    fetch_key(ctx, relay).await
}

/// Record the workspace link, replacing any previous one.
pub(crate) async fn link_workspace(ctx: &Ctx, project: &ProjectId, env_file: &Path) -> Result<()> {
    let mut state = WorkspaceState::load(&ctx.data_dir).await?;
    if let Some(previous) = state.get(&ctx.workspace) {
        if &previous.project_id != project {
            println!("  (was linked to {})", previous.project_id);
        }
    }
    state.link(&ctx.workspace, WorkspaceLink::new(project.clone(), env_file));
    state.save(&ctx.data_dir).await
}

/// Make sure the project key is available locally, if anyone shared it yet.
pub(crate) async fn fetch_key<R: Relay>(ctx: &Ctx, relay: R) -> Result<()> {
    match open_client(ctx, relay).await {
        Ok(_) => {
            println!("  Project key available on this machine.");
            Ok(())
        }
        Err(e) => match e.downcast_ref::<ClientError>() {
            Some(ClientError::MissingProjectKey(_)) => {
                println!("  Project key not shared with you yet.");
                println!("  It will arrive after any member runs 'envsync push' or 'envsync pull'.");
                Ok(())
            }
            _ => Err(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{machine, project_owner};
    use crate::config::{load_project_key, require_link};

    #[tokio::test]
    async fn owner_relinks_from_another_directory() {
        let owner = project_owner().await;
        let project = require_link(&owner.ctx.data_dir, &owner.ctx.workspace)
            .await
            .unwrap()
            .project_id;

        // Same machine, different checkout; key cache wiped to force recovery.
        let other = tempfile::tempdir().unwrap();
        let ctx = Ctx {
            workspace: other.path().to_path_buf(),
            ..owner.ctx.clone()
        };
        std::fs::remove_dir_all(owner.ctx.data_dir.join("keys")).unwrap();

        run(&ctx, owner.relay.clone(), &project, Path::new(".env.local"))
            .await
            .unwrap();

        let link = require_link(&ctx.data_dir, &ctx.workspace).await.unwrap();
        assert_eq!(link.project_id, project);
        assert!(load_project_key(&ctx.data_dir, &project)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn non_member_cannot_link() {
        let owner = project_owner().await;
        let project = require_link(&owner.ctx.data_dir, &owner.ctx.workspace)
            .await
            .unwrap()
            .project_id;
        let eve = machine(owner.relay.signup("eve@example.com")).await;

        assert!(run(&eve.ctx, eve.relay.clone(), &project, Path::new(".env"))
            .await
            .is_err());
        assert!(require_link(&eve.ctx.data_dir, &eve.ctx.workspace)
            .await
            .is_err());
    }
}
