//! Encrypt the workspace's env file and push it as a new version.

use anyhow::Result;
use envsync_client::{Confirm, PushOptions, Relay};
use envsync_core::parse_env;
use envsync_types::Version;

use crate::commands::{explain, open_client, read_mirror, report_distribution, Ctx};
use crate::config::record_version;

/// Options for [`run`].
#[derive(Debug, Clone, Default)]
pub struct PushArgs {
    /// Change message.
    pub message: Option<String>,
    /// Push even if the relay moved ahead.
    pub force: bool,
}

/// Run the push command.
pub async fn run<R: Relay>(
    ctx: &Ctx,
    relay: R,
    args: PushArgs,
    confirm: &dyn Confirm,
) -> Result<Version> {
    let (client, link) = open_client(ctx, relay).await?;
    let path = ctx.env_path(&link);
    let data = read_mirror(&path).await?;

    let entries = std::str::from_utf8(&data)
        .map(|text| parse_env(text).len())
        .unwrap_or(0);
    if entries == 0 {
        tracing::warn!(path = %path.display(), "pushing a file with no KEY=VALUE entries");
    }

    let options = PushOptions {
        message: args.message,
        last_known: link.last_pushed_version,
        force: args.force,
    };
    let outcome = client.push(&data, options, confirm).await.map_err(explain)?;
    record_version(&ctx.data_dir, &ctx.workspace, outcome.version).await?;

    println!(
        "Pushed {} ({} keys) as v{}",
        link.env_file.display(),
        entries,
        outcome.version
    );
    report_distribution(&outcome.distribution);
    Ok(outcome.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::project_owner;
    use crate::config::require_link;
    use envsync_client::AutoConfirm;

    #[tokio::test]
    async fn push_records_version() {
        let owner = project_owner().await;
        owner.write_env("A=1\n");

        let v1 = run(&owner.ctx, owner.relay.clone(), PushArgs::default(), &AutoConfirm(true))
            .await
            .unwrap();
        owner.write_env("A=2\n");
        let v2 = run(&owner.ctx, owner.relay.clone(), PushArgs::default(), &AutoConfirm(true))
            .await
            .unwrap();

        assert_eq!(v1, Version::new(1));
        assert_eq!(v2, Version::new(2));
        let link = require_link(&owner.ctx.data_dir, &owner.ctx.workspace)
            .await
            .unwrap();
        assert_eq!(link.last_pushed_version, Version::new(2));
    }

    #[tokio::test]
    async fn push_without_env_file_fails() {
        let owner = project_owner().await;
        let result = run(&owner.ctx, owner.relay.clone(), PushArgs::default(), &AutoConfirm(true)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn declined_conflict_leaves_relay_untouched() {
        let owner = project_owner().await;
        owner.write_env("A=1\n");
        run(&owner.ctx, owner.relay.clone(), PushArgs::default(), &AutoConfirm(true))
            .await
            .unwrap();

        // Someone else pushes twice behind our back.
        let link = require_link(&owner.ctx.data_dir, &owner.ctx.workspace)
            .await
            .unwrap();
        let (client, _) = open_client(&owner.ctx, owner.relay.clone()).await.unwrap();
        client.push_unchecked(b"A=x\n", None).await.unwrap();
        client.push_unchecked(b"A=y\n", None).await.unwrap();

        owner.write_env("A=2\n");
        let err = run(&owner.ctx, owner.relay.clone(), PushArgs::default(), &AutoConfirm(false))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("push aborted"));
        assert_eq!(owner.relay.snapshot_count(&link.project_id), 3);

        let forced = PushArgs {
            force: true,
            ..Default::default()
        };
        let v = run(&owner.ctx, owner.relay.clone(), forced, &AutoConfirm(false))
            .await
            .unwrap();
        assert_eq!(v, Version::new(4));
    }
}
