//! Show identity, workspace link and sync state.

use anyhow::Result;
use envsync_client::{fingerprint, Relay};
use envsync_types::Version;

use crate::commands::{open_client, Ctx};
use crate::config::{Credentials, IdentityFile, WorkspaceState};

/// Where the workspace stands relative to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// The workspace is not linked to a project.
    Unlinked,
    /// The relay could not be asked.
    Unknown,
    /// Mirror matches the relay head.
    InSync,
    /// Mirror differs from the relay head.
    LocalChanges,
    /// The relay has versions this workspace has not seen.
    Behind {
        /// Relay head.
        remote: Version,
    },
}

/// Run the status command. `relay` is `None` when not logged in.
pub async fn run<R: Relay>(ctx: &Ctx, relay: Option<R>) -> Result<SyncState> {
    println!("=== envsync status ===");
    println!();

    match IdentityFile::load(&ctx.data_dir).await {
        Ok(identity) => {
            println!("Identity:");
            println!("  Fingerprint: {}", fingerprint(&identity.public_key));
        }
        Err(_) => {
            println!("Identity: NOT INITIALIZED");
            println!();
            println!("Run 'envsync init' to create one.");
            return Ok(SyncState::Unlinked);
        }
    }
    match Credentials::load(&ctx.data_dir).await {
        Ok(creds) => println!("  Account:     {}", creds.email),
        Err(_) => println!("  Account:     not logged in"),
    }
    println!("  Relay:       {}", ctx.settings.api_url);
    println!();

    let state = WorkspaceState::load(&ctx.data_dir).await?;
    let Some(link) = state.get(&ctx.workspace).cloned() else {
        println!("Workspace {}: not linked", ctx.workspace.display());
        println!();
        println!("Run 'envsync create' or 'envsync join' here.");
        return Ok(SyncState::Unlinked);
    };

    let path = ctx.env_path(&link);
    println!("Workspace {}:", ctx.workspace.display());
    println!("  Project:     {}", link.project_id);
    println!(
        "  Env file:    {}{}",
        link.env_file.display(),
        if path.exists() { "" } else { " (missing)" }
    );
    println!("  Last synced: v{}", link.last_pushed_version);

    let Some(relay) = relay else {
        println!("  Remote:      unknown (not logged in)");
        return Ok(SyncState::Unknown);
    };

    let sync = match remote_state(ctx, relay, link.last_pushed_version, &path).await {
        Ok(sync) => sync,
        Err(e) => {
            tracing::debug!(error = %e, "status: relay check failed");
            println!("  Remote:      unknown ({})", e);
            return Ok(SyncState::Unknown);
        }
    };
    match &sync {
        SyncState::InSync => println!("  Remote:      up to date"),
        SyncState::LocalChanges => println!("  Remote:      up to date, local edits not pushed"),
        SyncState::Behind { remote } => {
            println!("  Remote:      v{} available (run 'envsync pull')", remote)
        }
        SyncState::Unlinked | SyncState::Unknown => {}
    }
    Ok(sync)
}

async fn remote_state<R: Relay>(
    ctx: &Ctx,
    relay: R,
    last_seen: Version,
    path: &std::path::Path,
) -> Result<SyncState> {
    let (client, _) = open_client(ctx, relay).await?;
    let remote = client.remote_version().await?;
    if remote > last_seen {
        return Ok(SyncState::Behind { remote });
    }
    if remote.is_zero() {
        return Ok(if path.exists() {
            SyncState::LocalChanges
        } else {
            SyncState::InSync
        });
    }

    let head = client.pull().await?;
    let local = tokio::fs::read(path).await.unwrap_or_default();
    Ok(if local == head.plaintext {
        SyncState::InSync
    } else {
        SyncState::LocalChanges
    })
}
