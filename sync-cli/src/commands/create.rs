//! Create a project and link the current workspace to it.

use anyhow::Result;
use envsync_client::{EnvClient, Relay};
use std::path::Path;

use crate::commands::{explain, Ctx};
use crate::config::{load_identity, save_project_key, WorkspaceLink, WorkspaceState};

/// Run the create command.
pub async fn run<R: Relay>(ctx: &Ctx, relay: R, name: &str, env_file: &Path) -> Result<()> {
    let identity = load_identity(&ctx.data_dir).await?;
    let mut state = WorkspaceState::load(&ctx.data_dir).await?;
    if let Some(existing) = state.get(&ctx.workspace) {
        anyhow::bail!(
            "{} is already linked to project {}",
            ctx.workspace.display(),
            existing.project_id
        );
    }

    let (client, project) = EnvClient::create_project(relay, name, identity)
        .await
        .map_err(explain)?;
    save_project_key(&ctx.data_dir, client.project(), client.key()).await?;

    state.link(&ctx.workspace, WorkspaceLink::new(project.id.clone(), env_file));
    state.save(&ctx.data_dir).await?;

    println!("Created project '{}'", project.name);
    println!();
    println!("  Project ID: {}", project.id);
    println!("  Workspace:  {}", ctx.workspace.display());
    println!("  Env file:   {}", env_file.display());
    println!();
    println!("Next: envsync push, then envsync invite <email>");
    Ok(())
}
