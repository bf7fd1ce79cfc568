//! Restore an earlier version as the new head.

use anyhow::{Context, Result};
use envsync_client::{Confirm, PushOptions, Relay};
use envsync_core::diff_documents;
use envsync_types::Version;

use crate::commands::{explain, open_client, report_distribution, Ctx};
use crate::config::record_version;

/// Run the rollback command.
///
/// The target's content is pushed as a new version and written to the
/// workspace's env file; earlier versions stay in history.
pub async fn run<R: Relay>(
    ctx: &Ctx,
    relay: R,
    target: Version,
    force: bool,
    confirm: &dyn Confirm,
) -> Result<Version> {
    let (client, link) = open_client(ctx, relay).await?;
    let content = match client.fetch_version(target).await {
        Ok(content) => content,
        Err(e) if e.is_not_found() => anyhow::bail!("Version v{} does not exist", target),
        Err(e) => return Err(explain(e)),
    };

    let head = client.pull().await.map_err(explain)?;
    let changes = diff_documents(
        &String::from_utf8_lossy(&head.plaintext),
        &String::from_utf8_lossy(&content),
    );
    println!("v{} -> v{}: {} key(s) change", head.version, target, changes.len());
    for (key, _) in &changes.added {
        println!("  + {}", key);
    }
    for (key, _) in &changes.removed {
        println!("  - {}", key);
    }
    for change in &changes.changed {
        println!("  ~ {}", change.key);
    }

    let options = PushOptions {
        message: None,
        last_known: link.last_pushed_version,
        force,
    };
    let outcome = client
        .restore(target, &content, options, confirm)
        .await
        .map_err(explain)?;

    let path = ctx.env_path(&link);
    tokio::fs::write(&path, &content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    record_version(&ctx.data_dir, &ctx.workspace, outcome.version).await?;

    println!("Rolled back to v{} (now v{})", target, outcome.version);
    report_distribution(&outcome.distribution);
    Ok(outcome.version)
}
