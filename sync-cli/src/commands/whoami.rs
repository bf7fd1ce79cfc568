//! Show who this machine is logged in as.

use anyhow::Result;
use envsync_client::{fingerprint, Relay};
use std::path::Path;

use crate::commands::explain;
use crate::config::load_identity;

/// Run the whoami command.
pub async fn run<R: Relay>(data_dir: &Path, relay: R) -> Result<()> {
    let identity = load_identity(data_dir).await?;
    let member = relay.whoami().await.map_err(|e| explain(e.into()))?;

    println!("Member:      {} ({})", member.email, member.id);
    println!("Fingerprint: {}", identity.fingerprint());
    match member.public_key {
        Some(registered) if registered == identity.public_key() => {}
        Some(registered) => {
            println!();
            println!(
                "Warning: the relay has a different identity on file ({}).",
                fingerprint(&registered)
            );
            println!("Run 'envsync login' to register this machine's identity.");
        }
        None => {
            println!();
            println!("Identity not registered yet. Run 'envsync login'.");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::machine;
    use envsync_client::MemoryRelay;

    #[tokio::test]
    async fn whoami_needs_identity() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(dir.path(), MemoryRelay::new("a@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn whoami_with_registered_identity() {
        let m = machine(MemoryRelay::new("a@example.com")).await;
        run(&m.ctx.data_dir, m.relay.clone()).await.unwrap();
    }
}
