//! Compare the workspace's env file with the latest pushed version.

use anyhow::Result;
use envsync_client::Relay;
use envsync_core::EnvDiff;

use crate::commands::{explain, open_client, Ctx};

/// Run the diff command.
pub async fn run<R: Relay>(ctx: &Ctx, relay: R, json: bool) -> Result<EnvDiff> {
    let (client, link) = open_client(ctx, relay).await?;
    let path = ctx.env_path(&link);
    let local = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let report = client.diff(&local).await.map_err(explain)?;
    let diff = report.diff;

    if json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
        return Ok(diff);
    }

    if diff.is_empty() {
        println!("{} matches v{}", link.env_file.display(), report.remote_version);
        return Ok(diff);
    }

    println!(
        "{} vs v{} ({} difference(s)):",
        link.env_file.display(),
        report.remote_version,
        diff.len()
    );
    for (key, value) in &diff.added {
        println!("  + {}={}", key, value);
    }
    for (key, value) in &diff.removed {
        println!("  - {}={}", key, value);
    }
    for change in &diff.changed {
        println!("  ~ {}: {} -> {}", change.key, change.local, change.remote);
    }
    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::push::{self, PushArgs};
    use crate::commands::test_support::project_owner;
    use envsync_client::AutoConfirm;

    #[tokio::test]
    async fn diff_reports_added_removed_changed() {
        let owner = project_owner().await;
        owner.write_env("B=3\nC=4\n");
        push::run(&owner.ctx, owner.relay.clone(), PushArgs::default(), &AutoConfirm(true))
            .await
            .unwrap();

        owner.write_env("A=1\nB=2\n");
        let diff = run(&owner.ctx, owner.relay.clone(), false).await.unwrap();
        assert_eq!(diff.added, vec![("C".to_string(), "4".to_string())]);
        assert_eq!(diff.removed, vec![("A".to_string(), "1".to_string())]);
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].key, "B");
        assert_eq!(diff.changed[0].local, "2");
        assert_eq!(diff.changed[0].remote, "3");
    }

    #[tokio::test]
    async fn missing_local_file_shows_everything_added() {
        let owner = project_owner().await;
        owner.write_env("A=1\n");
        push::run(&owner.ctx, owner.relay.clone(), PushArgs::default(), &AutoConfirm(true))
            .await
            .unwrap();
        std::fs::remove_file(owner.env_path()).unwrap();

        let diff = run(&owner.ctx, owner.relay.clone(), true).await.unwrap();
        assert_eq!(diff.added.len(), 1);
        assert!(diff.removed.is_empty());
    }
}
