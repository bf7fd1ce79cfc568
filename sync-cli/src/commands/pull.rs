//! Fetch the latest version and write it to the workspace's env file.

use anyhow::{Context, Result};
use envsync_client::Relay;
use envsync_types::Version;
use std::io::Write;

use crate::commands::{explain, open_client, report_distribution, Ctx};
use crate::config::record_version;

/// Run the pull command. With `to_stdout` the file is left untouched.
pub async fn run<R: Relay>(ctx: &Ctx, relay: R, to_stdout: bool) -> Result<Version> {
    let (client, link) = open_client(ctx, relay).await?;
    let pulled = match client.pull().await {
        Ok(pulled) => pulled,
        Err(e) if e.is_not_found() => {
            anyhow::bail!("Nothing has been pushed to project {} yet", client.project())
        }
        Err(e) => return Err(explain(e)),
    };

    if to_stdout {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&pulled.plaintext)?;
        stdout.flush()?;
        return Ok(pulled.version);
    }

    let path = ctx.env_path(&link);
    tokio::fs::write(&path, &pulled.plaintext)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    record_version(&ctx.data_dir, &ctx.workspace, pulled.version).await?;

    println!("Pulled v{} into {}", pulled.version, link.env_file.display());
    report_distribution(&pulled.distribution);
    Ok(pulled.version)
}
