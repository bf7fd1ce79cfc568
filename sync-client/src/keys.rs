//! Project key distribution.
//!
//! Members receive the project key as a [`KeyGrant`]: the key wrapped for
//! their identity plus the public key of whoever wrapped it. The relay keeps
//! a member "pending" until an envelope exists for them, so any member that
//! holds the key can finish the hand-off on their next push or pull.

use envsync_types::{IdentityPublicKey, KeyGrant, ProjectId};
use tracing::{debug, info, warn};

use crate::crypto::{unwrap_key, wrap_key, CryptoError, Identity, ProjectKey};
use crate::relay::{Relay, RelayError};

/// Outcome of one pending-key distribution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributionReport {
    /// Envelopes uploaded.
    pub shared: usize,
    /// Members whose envelope could not be wrapped or uploaded.
    pub failed: usize,
    /// True when the pending list itself could not be fetched.
    pub skipped: bool,
}

impl DistributionReport {
    /// Some member was left without a key this round.
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }

    /// Nothing was shared or attempted.
    pub fn is_noop(&self) -> bool {
        self.shared == 0 && self.failed == 0
    }
}

/// Wrap `key` for `recipient`, signed by `sender`.
pub fn grant_for(
    key: &ProjectKey,
    recipient: &IdentityPublicKey,
    sender: &Identity,
) -> Result<KeyGrant, CryptoError> {
    Ok(KeyGrant {
        envelope: wrap_key(key, recipient, sender)?,
        sender_public_key: sender.public_key(),
    })
}

/// The creator's own copy, wrapped to themselves.
pub fn self_grant(key: &ProjectKey, identity: &Identity) -> Result<KeyGrant, CryptoError> {
    grant_for(key, &identity.public_key(), identity)
}

/// Open a grant addressed to `identity`.
pub fn open_grant(grant: &KeyGrant, identity: &Identity) -> Result<ProjectKey, CryptoError> {
    unwrap_key(&grant.envelope, &grant.sender_public_key, identity)
}

/// Fetch and open the caller's own envelope for a project.
///
/// Used to recover the project key on a fresh install or after `join`.
pub async fn fetch_project_key<R: Relay + ?Sized>(
    relay: &R,
    project: &ProjectId,
    identity: &Identity,
) -> Result<ProjectKey, KeyFetchError> {
    let grant = relay.my_key(project).await?;
    Ok(open_grant(&grant, identity)?)
}

/// Failure to recover a project key from the relay.
#[derive(Debug, thiserror::Error)]
pub enum KeyFetchError {
    /// The relay call failed (including "no envelope yet").
    #[error(transparent)]
    Relay(#[from] RelayError),
    /// The envelope did not open with our identity.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Share the project key with every member still waiting for it.
///
/// Best effort: each member is handled independently, failures are logged
/// and counted, and the pass itself never fails.
pub async fn sync_pending_keys<R: Relay + ?Sized>(
    relay: &R,
    project: &ProjectId,
    key: &ProjectKey,
    identity: &Identity,
) -> DistributionReport {
    let mut report = DistributionReport::default();

    let pending = match relay.pending_keys(project).await {
        Ok(pending) => pending,
        Err(e) => {
            warn!(project = %project, error = %e, "could not list members pending a key");
            report.skipped = true;
            return report;
        }
    };

    if pending.is_empty() {
        debug!(project = %project, "no members pending a key");
        return report;
    }

    for member in pending {
        let grant = match grant_for(key, &member.public_key, identity) {
            Ok(grant) => grant,
            Err(e) => {
                warn!(member = %member.member_id, error = %e, "failed to wrap project key");
                report.failed += 1;
                continue;
            }
        };
        match relay
            .upload_member_key(project, &member.member_id, grant)
            .await
        {
            Ok(()) => {
                debug!(member = %member.member_id, "shared project key");
                report.shared += 1;
            }
            Err(e) => {
                warn!(member = %member.member_id, error = %e, "failed to upload key envelope");
                report.failed += 1;
            }
        }
    }

    info!(
        project = %project,
        shared = report.shared,
        failed = report.failed,
        "key distribution finished"
    );
    report
}
