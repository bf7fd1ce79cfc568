//! Keep the workspace's env file and the relay in step until interrupted.

use std::future::Future;

use anyhow::{Context, Result};
use envsync_client::{
    Confirm, FileMirror, Relay, WatchConfig, WatchError, WatchLoop, WatchSummary,
};
use envsync_core::WatchNotice;
use tokio::sync::mpsc;

use crate::commands::{explain, open_client, Ctx};
use crate::config::record_version;

/// Run the watch command until `shutdown` resolves.
pub async fn run<R, F>(
    ctx: &Ctx,
    relay: R,
    confirm: &dyn Confirm,
    shutdown: F,
) -> Result<WatchSummary>
where
    R: Relay,
    F: Future<Output = ()>,
{
    let (client, link) = open_client(ctx, relay).await?;
    let path = ctx.env_path(&link);

    let (tx, rx) = mpsc::channel(1);
    let mirror = FileMirror::start(&path, ctx.settings.debounce(), tx)
        .with_context(|| format!("Failed to watch {}", path.display()))?;
    let config = WatchConfig {
        poll_interval: ctx.settings.poll_interval(),
    };

    println!(
        "Watching {} (project {}, every {}s). Press Ctrl+C to stop.",
        link.env_file.display(),
        link.project_id,
        config.poll_interval.as_secs()
    );

    // The file may already hold a newer version when the loop ends in error.
    let mut synced = link.last_pushed_version;
    let result = WatchLoop::new(&client, confirm, mirror, rx, &path, config)
        .starting_at(link.last_pushed_version)
        .run(shutdown, |notice| {
            if let WatchNotice::Pulled { version } | WatchNotice::Pushed { version } = notice {
                synced = *version;
            }
            print_notice(notice);
        })
        .await;

    if synced > link.last_pushed_version {
        record_version(&ctx.data_dir, &ctx.workspace, synced).await?;
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(WatchError::Client(e)) => return Err(explain(e)),
    };
    println!(
        "Stopped. {} pull(s), {} push(es), at v{}.",
        summary.pulls, summary.pushes, summary.last_version
    );
    Ok(summary)
}

fn print_notice(notice: &WatchNotice) {
    match notice {
        WatchNotice::Pulled { version } => println!("  <- pulled v{}", version),
        WatchNotice::Pushed { version } => println!("  -> pushed v{}", version),
        WatchNotice::PushDeclined => println!("  local changes kept, not pushed"),
        WatchNotice::PullFailed { error } => eprintln!("  pull failed: {}", error),
        WatchNotice::PushFailed { error } => eprintln!("  push failed: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::push::{self, PushArgs};
    use crate::commands::test_support::{machine, project_owner};
    use crate::config::require_link;
    use envsync_client::{AutoConfirm, MemoryRelay, RelayError};
    use envsync_types::Version;
    use std::time::Duration;

    #[tokio::test]
    async fn unlinked_workspace_fails() {
        let m = machine(MemoryRelay::new("solo@example.com")).await;
        let err = run(&m.ctx, m.relay.clone(), &AutoConfirm(false), async {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("envsync create"));
    }

    #[tokio::test]
    async fn pulls_missed_version_and_records_it() {
        let owner = project_owner().await;
        owner.write_env("A=1\n");
        push::run(&owner.ctx, owner.relay.clone(), PushArgs::default(), &AutoConfirm(true))
            .await
            .unwrap();
        std::fs::remove_file(owner.env_path()).unwrap();
        record_version(&owner.ctx.data_dir, &owner.ctx.workspace, Version::zero())
            .await
            .unwrap();

        let summary = run(
            &owner.ctx,
            owner.relay.clone(),
            &AutoConfirm(false),
            tokio::time::sleep(Duration::from_millis(500)),
        )
        .await
        .unwrap();

        assert_eq!(summary.pulls, 1);
        assert_eq!(summary.last_version, Version::new(1));
        assert_eq!(owner.read_env(), "A=1\n");
        let link = require_link(&owner.ctx.data_dir, &owner.ctx.workspace)
            .await
            .unwrap();
        assert_eq!(link.last_pushed_version, Version::new(1));
    }

    #[tokio::test]
    async fn pulled_version_is_recorded_when_watch_fails() {
        let mut owner = project_owner().await;
        owner.ctx.settings.poll_interval_secs = 1;
        owner.write_env("A=1\n");
        push::run(&owner.ctx, owner.relay.clone(), PushArgs::default(), &AutoConfirm(true))
            .await
            .unwrap();
        std::fs::remove_file(owner.env_path()).unwrap();
        record_version(&owner.ctx.data_dir, &owner.ctx.workspace, Version::zero())
            .await
            .unwrap();

        // The first tick pulls v1; the next version check is rejected.
        let relay = owner.relay.clone();
        let shutdown = async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            relay.fail_next_version(RelayError::Unauthorized);
            tokio::time::sleep(Duration::from_secs(10)).await;
        };

        let result = run(&owner.ctx, owner.relay.clone(), &AutoConfirm(false), shutdown).await;

        assert!(result.is_err());
        assert_eq!(owner.read_env(), "A=1\n");
        let link = require_link(&owner.ctx.data_dir, &owner.ctx.workspace)
            .await
            .unwrap();
        assert_eq!(link.last_pushed_version, Version::new(1));
    }
}
