//! CLI command implementations.
//!
//! Commands are generic over [`Relay`] so tests can run them against
//! [`envsync_client::MemoryRelay`]; `main` hands in an `HttpRelay`.

pub mod create;
pub mod diff;
pub mod history;
pub mod init;
pub mod invite;
pub mod join;
pub mod link;
pub mod login;
pub mod members;
pub mod pull;
pub mod push;
pub mod rollback;
pub mod status;
pub mod watch;
pub mod whoami;

use anyhow::Result;
use envsync_client::{ClientError, DistributionReport, EnvClient, Relay};
use std::path::{Path, PathBuf};

use crate::config::{
    load_identity, load_project_key, require_link, save_project_key, Settings, WorkspaceLink,
};

/// Where a command runs.
#[derive(Debug, Clone)]
pub struct Ctx {
    /// envsync data directory.
    pub data_dir: PathBuf,
    /// Canonical workspace directory.
    pub workspace: PathBuf,
    /// Loaded settings.
    pub settings: Settings,
}

impl Ctx {
    /// Mirror path for a link in this workspace.
    pub fn env_path(&self, link: &WorkspaceLink) -> PathBuf {
        link.env_path(&self.workspace)
    }
}

/// Open the linked project, recovering and caching the key if needed.
pub async fn open_client<R: Relay>(ctx: &Ctx, relay: R) -> Result<(EnvClient<R>, WorkspaceLink)> {
    let identity = load_identity(&ctx.data_dir).await?;
    let link = require_link(&ctx.data_dir, &ctx.workspace).await?;
    let cached = load_project_key(&ctx.data_dir, &link.project_id).await?;
    let recovered = cached.is_none();

    let client = EnvClient::open(relay, link.project_id.clone(), identity, cached)
        .await
        .map_err(explain)?;
    if recovered {
        save_project_key(&ctx.data_dir, client.project(), client.key()).await?;
        tracing::info!(project = %client.project(), "recovered project key from relay");
    }
    Ok((client, link))
}

/// Turn a client error into a message that says what to do next.
pub fn explain(err: ClientError) -> anyhow::Error {
    if err.is_unauthorized() {
        anyhow::anyhow!("Not authenticated: your token was rejected. Run 'envsync login' again.")
    } else if err.is_authentication_failure() {
        anyhow::anyhow!(
            "Decryption failed: the data was not encrypted with your project key or was tampered with. Refusing to use it."
        )
    } else {
        anyhow::Error::new(err)
    }
}

/// Print the key-sharing note that follows a push or pull.
pub fn report_distribution(report: &DistributionReport) {
    if report.shared > 0 {
        println!("  Shared project key with {} member(s)", report.shared);
    }
    if report.is_partial() {
        println!(
            "  Note: key sharing failed for {} member(s); it will be retried on the next push or pull",
            report.failed
        );
    }
}

/// Read the mirror file for a workspace.
pub async fn read_mirror(path: &Path) -> Result<Vec<u8>> {
    use anyhow::Context;
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}
