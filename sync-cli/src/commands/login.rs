//! Store relay credentials and register this machine's identity.

use anyhow::{Context, Result};
use envsync_client::{Identity, Relay};
use std::path::Path;

use crate::commands::explain;
use crate::config::{Credentials, IdentityFile};

/// Run the login command with a relay already authenticated by `token`.
///
/// `token` is stored exactly as given, so it must already be trimmed.
/// Creates the identity first if this machine has none.
pub async fn run<R: Relay>(data_dir: &Path, relay: R, token: &str) -> Result<()> {
    if token.is_empty() {
        anyhow::bail!("Token must not be empty");
    }

    let identity = if IdentityFile::exists(data_dir).await {
        IdentityFile::load(data_dir).await?.to_identity()?
    } else {
        let identity = Identity::generate()?;
        IdentityFile::from_identity(&identity).save(data_dir).await?;
        println!("Created a new identity for this machine.");
        identity
    };

    let member = relay.whoami().await.map_err(|e| explain(e.into()))?;
    relay
        .register_identity(&identity.public_key())
        .await
        .map_err(|e| explain(e.into()))
        .context("Failed to register identity with the relay")?;

    Credentials {
        token: token.to_string(),
        member_id: member.id.clone(),
        email: member.email.clone(),
    }
    .save(data_dir)
    .await?;

    println!("Logged in as {}", member.email);
    println!("  Fingerprint: {}", identity.fingerprint());
    Ok(())
}
