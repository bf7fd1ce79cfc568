//! Generate this machine's identity.

use anyhow::Result;
use envsync_client::Identity;
use std::path::Path;

use crate::config::IdentityFile;

/// Run the init command.
pub async fn run(data_dir: &Path) -> Result<()> {
    if IdentityFile::exists(data_dir).await {
        anyhow::bail!(
            "Identity already exists. Delete {} to create a new one (existing project keys shared with it will be lost).",
            data_dir.join("identity.json").display()
        );
    }

    let identity = Identity::generate()?;
    IdentityFile::from_identity(&identity).save(data_dir).await?;

    println!("Identity created.");
    println!();
    println!("  Fingerprint: {}", identity.fingerprint());
    println!("  Data dir:    {}", data_dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Log in:             envsync login");
    println!("  2. Create a project:   envsync create <name>");
    println!("  3. Or join a project:  envsync join <invitation-id>");

    Ok(())
}
