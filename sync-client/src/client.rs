//! EnvClient - the main interface for envsync.
//!
//! [`EnvClient`] binds a relay handle, a project, its symmetric key and the
//! local identity, and implements the snapshot operations on top of them.
//!
//! # Architecture
//!
//! ```text
//! CLI / watch loop → EnvClient → Relay → HTTPS
//!                        ↓
//!            envsync-core (conflict gate, diff, history walk)
//! ```
//!
//! Every push and pull finishes with a pending-key distribution pass whose
//! result is reported alongside the outcome and never turns it into an error.
//!
//! # Example
//!
//! ```ignore
//! let client = EnvClient::open(relay, project_id, identity, cached_key).await?;
//! let outcome = client.push(text.as_bytes(), PushOptions::default(), &AutoConfirm(true)).await?;
//! let pulled = client.pull().await?;
//! ```

use async_trait::async_trait;
use envsync_core::{check_conflict, diff_documents, ConflictCheck, EnvDiff, HistoryWalk};
use envsync_types::{
    HistoryEntry, HistoryPage, Invitation, Member, Project, ProjectId, Version,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crypto::{decrypt_symmetric, encrypt_symmetric, CryptoError, Identity, ProjectKey};
use crate::keys::{
    fetch_project_key, grant_for, self_grant, sync_pending_keys, DistributionReport,
    KeyFetchError,
};
use crate::relay::{Relay, RelayError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Relay error.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Crypto error.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The relay moved past the last version this workspace pushed and the
    /// user declined to overwrite it.
    #[error("push aborted: remote is at v{remote}, this workspace last pushed v{local}")]
    Conflict {
        /// Last version pushed from this workspace.
        local: Version,
        /// Current head on the relay.
        remote: Version,
    },

    /// The user interrupted the confirmation prompt.
    #[error("push cancelled")]
    Cancelled,

    /// No local project key and no envelope shared with us yet.
    #[error("no project key for {0}: ask a member to run `envsync push` or `envsync pull` to share it")]
    MissingProjectKey(ProjectId),

    /// Decrypted environment is not valid UTF-8.
    #[error("environment is not valid UTF-8")]
    InvalidUtf8,
}

impl ClientError {
    /// The relay rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Relay(e) if e.is_unauthorized())
    }

    /// Project, snapshot or version does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Relay(e) if e.is_not_found())
    }

    /// Ciphertext or envelope failed to authenticate.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::AuthenticationFailure))
    }
}

/// Answer to a [`Confirm`] prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// Proceed.
    Yes,
    /// Do not proceed.
    No,
    /// The prompt was interrupted (Ctrl+C); the caller should stop.
    Interrupted,
}

/// Asks the user a yes/no question.
#[async_trait]
pub trait Confirm: Send + Sync {
    /// Ask `prompt`.
    async fn confirm(&self, prompt: &str) -> Answer;
}

/// A [`Confirm`] that always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, _prompt: &str) -> Answer {
        if self.0 {
            Answer::Yes
        } else {
            Answer::No
        }
    }
}

/// Options for [`EnvClient::push`].
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Change message stored with the snapshot.
    pub message: Option<String>,
    /// Last version this workspace pushed (`0` if never).
    pub last_known: Version,
    /// Skip the conflict check.
    pub force: bool,
}

/// Result of a successful push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// Version assigned by the relay.
    pub version: Version,
    /// Key distribution performed afterwards.
    pub distribution: DistributionReport,
}

/// Result of a successful pull.
#[derive(Clone)]
pub struct PullOutcome {
    /// Decrypted environment document.
    pub plaintext: Vec<u8>,
    /// Version it came from.
    pub version: Version,
    /// Key distribution performed afterwards.
    pub distribution: DistributionReport,
}

impl std::fmt::Debug for PullOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullOutcome")
            .field("plaintext", &format_args!("[{} bytes]", self.plaintext.len()))
            .field("version", &self.version)
            .field("distribution", &self.distribution)
            .finish()
    }
}

/// Result of [`EnvClient::invite`].
#[derive(Debug, Clone)]
pub struct InviteOutcome {
    /// The invitation to hand to the invitee.
    pub invitation: Invitation,
    /// Whether the invitee's envelope was uploaded right away.
    pub shared_immediately: bool,
    /// Pending-key pass run after inviting.
    pub distribution: DistributionReport,
}

/// Local environment compared with the relay's head.
#[derive(Debug, Clone)]
pub struct DiffReport {
    /// Keys added, removed and changed on the relay relative to local.
    pub diff: EnvDiff,
    /// Version the remote side was taken from.
    pub remote_version: Version,
}

/// envsync client for one project.
pub struct EnvClient<R: Relay> {
    relay: R,
    project: ProjectId,
    key: ProjectKey,
    identity: Identity,
}

impl<R: Relay> EnvClient<R> {
    /// Create a client from an already known project key.
    pub fn new(relay: R, project: ProjectId, key: ProjectKey, identity: Identity) -> Self {
        Self {
            relay,
            project,
            key,
            identity,
        }
    }

    /// Create a new project with a fresh key, self-wrapped for the creator.
    pub async fn create_project(
        relay: R,
        name: &str,
        identity: Identity,
    ) -> Result<(Self, Project), ClientError> {
        let key = ProjectKey::generate()?;
        let grant = self_grant(&key, &identity)?;
        let project = relay.create_project(name, grant).await?;
        info!(project = %project.id, name = %project.name, "created project");
        Ok((Self::new(relay, project.id.clone(), key, identity), project))
    }

    /// Open a project, recovering the key from the relay when `cached` is `None`.
    pub async fn open(
        relay: R,
        project: ProjectId,
        identity: Identity,
        cached: Option<ProjectKey>,
    ) -> Result<Self, ClientError> {
        let key = match cached {
            Some(key) => key,
            None => {
                debug!(project = %project, "no local key, fetching own envelope");
                match fetch_project_key(&relay, &project, &identity).await {
                    Ok(key) => key,
                    Err(KeyFetchError::Relay(e)) if e.is_not_found() => {
                        return Err(ClientError::MissingProjectKey(project))
                    }
                    Err(KeyFetchError::Relay(e)) => return Err(e.into()),
                    Err(KeyFetchError::Crypto(e)) => return Err(e.into()),
                }
            }
        };
        Ok(Self::new(relay, project, key, identity))
    }

    /// The relay handle.
    pub fn relay(&self) -> &R {
        &self.relay
    }

    /// The project this client works on.
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// The project key.
    pub fn key(&self) -> &ProjectKey {
        &self.key
    }

    /// The local identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Current head version on the relay (`0` when nothing was pushed).
    pub async fn remote_version(&self) -> Result<Version, ClientError> {
        Ok(self.relay.env_version(&self.project).await?)
    }

    /// Encrypt and push a new snapshot.
    ///
    /// Unless `force` is set, the relay's head is checked first; if it moved
    /// past `last_known`, `confirm` decides whether to overwrite. Declining
    /// returns [`ClientError::Conflict`] with nothing uploaded. A failed
    /// version lookup skips the check.
    pub async fn push(
        &self,
        plaintext: &[u8],
        options: PushOptions,
        confirm: &dyn Confirm,
    ) -> Result<PushOutcome, ClientError> {
        let remote = if options.force {
            None
        } else {
            match self.relay.env_version(&self.project).await {
                Ok(version) => Some(version),
                Err(e) => {
                    warn!(error = %e, "version check failed, pushing without conflict check");
                    None
                }
            }
        };

        if let ConflictCheck::Conflict { local, remote } =
            check_conflict(options.last_known, remote, options.force)
        {
            let prompt = format!(
                "Remote is at v{}, but this workspace last pushed v{}. Overwrite anyway?",
                remote, local
            );
            match confirm.confirm(&prompt).await {
                Answer::Yes => {}
                Answer::No => return Err(ClientError::Conflict { local, remote }),
                Answer::Interrupted => return Err(ClientError::Cancelled),
            }
        }

        self.push_unchecked(plaintext, options.message).await
    }

    /// Encrypt and push without the conflict check.
    pub async fn push_unchecked(
        &self,
        plaintext: &[u8],
        message: Option<String>,
    ) -> Result<PushOutcome, ClientError> {
        let ciphertext = encrypt_symmetric(plaintext, &self.key)?;
        let version = self
            .relay
            .push_env(&self.project, ciphertext, message)
            .await?;
        info!(project = %self.project, version = %version, "pushed environment");
        let distribution = self.share_pending().await;
        Ok(PushOutcome {
            version,
            distribution,
        })
    }

    /// Fetch and decrypt the latest snapshot.
    pub async fn pull(&self) -> Result<PullOutcome, ClientError> {
        let snapshot = self.relay.pull_env(&self.project).await?;
        let plaintext = decrypt_symmetric(&snapshot.ciphertext, &self.key)?;
        info!(project = %self.project, version = %snapshot.version, "pulled environment");
        let distribution = self.share_pending().await;
        Ok(PullOutcome {
            plaintext,
            version: snapshot.version,
            distribution,
        })
    }

    /// Fetch and decrypt a historical snapshot.
    pub async fn fetch_version(&self, version: Version) -> Result<Vec<u8>, ClientError> {
        let snapshot = self.relay.env_at(&self.project, version).await?;
        Ok(decrypt_symmetric(&snapshot.ciphertext, &self.key)?)
    }

    /// Push the content of `target` as a new head version.
    ///
    /// History is never rewritten: `target` stays fetchable and the new
    /// snapshot is appended after the current head.
    pub async fn rollback(
        &self,
        target: Version,
        options: PushOptions,
        confirm: &dyn Confirm,
    ) -> Result<PushOutcome, ClientError> {
        let plaintext = self.fetch_version(target).await?;
        self.restore(target, &plaintext, options, confirm).await
    }

    /// Push `plaintext`, already fetched from `target`, as a new head version.
    pub async fn restore(
        &self,
        target: Version,
        plaintext: &[u8],
        options: PushOptions,
        confirm: &dyn Confirm,
    ) -> Result<PushOutcome, ClientError> {
        let options = PushOptions {
            message: options
                .message
                .or_else(|| Some(format!("Rollback to v{}", target))),
            ..options
        };
        self.push(plaintext, options, confirm).await
    }

    /// One page of history (1-based).
    pub async fn history(&self, page: u32, limit: u32) -> Result<HistoryPage, ClientError> {
        Ok(self.relay.history(&self.project, page, limit).await?)
    }

    /// The whole history, fetched page by page.
    pub async fn history_all(&self, page_size: u32) -> Result<Vec<HistoryEntry>, ClientError> {
        let mut walk = HistoryWalk::new(page_size);
        let mut entries = Vec::new();
        while let Some(page) = walk.next_page() {
            let resp = self.relay.history(&self.project, page, walk.limit()).await?;
            walk.record(resp.entries.len(), resp.total);
            entries.extend(resp.entries);
        }
        Ok(entries)
    }

    /// Compare a local document with the relay's head.
    pub async fn diff(&self, local: &str) -> Result<DiffReport, ClientError> {
        let pulled = self.pull().await?;
        let remote = String::from_utf8(pulled.plaintext).map_err(|_| ClientError::InvalidUtf8)?;
        Ok(DiffReport {
            diff: diff_documents(local, &remote),
            remote_version: pulled.version,
        })
    }

    /// Members of the project with their key status.
    pub async fn members(&self) -> Result<Vec<Member>, ClientError> {
        Ok(self.relay.list_members(&self.project).await?)
    }

    /// Invite someone by email.
    ///
    /// If the invitee already has an identity their envelope is uploaded now;
    /// otherwise it is shared by whoever pushes or pulls after they accept.
    pub async fn invite(&self, email: &str) -> Result<InviteOutcome, ClientError> {
        let invitation = self.relay.invite(&self.project, email).await?;
        info!(project = %self.project, email, invitation = %invitation.id, "created invitation");

        let mut shared_immediately = false;
        if let Some(invitee) = &invitation.invitee {
            let grant = grant_for(&self.key, &invitee.public_key, &self.identity)?;
            match self
                .relay
                .upload_member_key(&self.project, &invitee.member_id, grant)
                .await
            {
                Ok(()) => shared_immediately = true,
                // Not a member until they accept; the pending pass covers it.
                Err(e) => debug!(error = %e, "invitee envelope deferred"),
            }
        }

        let distribution = self.share_pending().await;
        Ok(InviteOutcome {
            invitation,
            shared_immediately,
            distribution,
        })
    }

    /// Share the project key with members still waiting for it.
    pub async fn share_pending(&self) -> DistributionReport {
        sync_pending_keys(&self.relay, &self.project, &self.key, &self.identity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::MemoryRelay;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingConfirm {
        answer: Answer,
        asked: AtomicUsize,
    }

    impl CountingConfirm {
        fn new(answer: Answer) -> Self {
            Self {
                answer,
                asked: AtomicUsize::new(0),
            }
        }

        fn asked(&self) -> usize {
            self.asked.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Confirm for CountingConfirm {
        async fn confirm(&self, _prompt: &str) -> Answer {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    async fn registered(relay: MemoryRelay) -> (MemoryRelay, Identity) {
        let identity = Identity::generate().unwrap();
        relay.register_identity(&identity.public_key()).await.unwrap();
        (relay, identity)
    }

    async fn new_project() -> EnvClient<MemoryRelay> {
        let (relay, identity) = registered(MemoryRelay::new("alice@example.com")).await;
        let (client, _) = EnvClient::create_project(relay, "api", identity)
            .await
            .unwrap();
        client
    }

    fn yes() -> AutoConfirm {
        AutoConfirm(true)
    }

    // ===========================================
    // Push / Pull Tests
    // ===========================================

    #[tokio::test]
    async fn push_then_pull_roundtrip() {
        let client = new_project().await;
        let outcome = client
            .push(b"A=1\nB=2\n", PushOptions::default(), &yes())
            .await
            .unwrap();
        assert_eq!(outcome.version, Version::new(1));

        let pulled = client.pull().await.unwrap();
        assert_eq!(pulled.plaintext, b"A=1\nB=2\n");
        assert_eq!(pulled.version, Version::new(1));
    }

    #[tokio::test]
    async fn versions_are_monotonic_and_pull_returns_latest() {
        let client = new_project().await;
        for i in 1..=4u64 {
            let text = format!("N={}\n", i);
            let outcome = client
                .push_unchecked(text.as_bytes(), None)
                .await
                .unwrap();
            assert_eq!(outcome.version, Version::new(i));
        }
        let pulled = client.pull().await.unwrap();
        assert_eq!(pulled.plaintext, b"N=4\n");
    }

    #[tokio::test]
    async fn pull_before_any_push_is_not_found() {
        let client = new_project().await;
        let err = client.pull().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn relay_only_stores_ciphertext() {
        let client = new_project().await;
        client
            .push_unchecked(b"SECRET=hunter2\n", None)
            .await
            .unwrap();
        let snapshot = client.relay().pull_env(client.project()).await.unwrap();
        assert!(!snapshot.ciphertext.as_sealed().as_str().contains("hunter2"));
    }

    #[tokio::test]
    async fn wrong_key_is_authentication_failure() {
        let client = new_project().await;
        client.push_unchecked(b"A=1\n", None).await.unwrap();

        let wrong = EnvClient::new(
            client.relay().clone(),
            client.project().clone(),
            ProjectKey::generate().unwrap(),
            client.identity().clone(),
        );
        let err = wrong.pull().await.unwrap_err();
        assert!(err.is_authentication_failure());
    }

    // ===========================================
    // Conflict Gate Tests
    // ===========================================

    #[tokio::test]
    async fn conflict_requires_confirmation() {
        let client = new_project().await;
        for _ in 0..3 {
            client.push_unchecked(b"A=1\n", None).await.unwrap();
        }
        let confirm = CountingConfirm::new(Answer::No);
        let options = PushOptions {
            last_known: Version::new(1),
            ..Default::default()
        };

        let err = client.push(b"A=2\n", options, &confirm).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Conflict { local, remote }
                if local == Version::new(1) && remote == Version::new(3)
        ));
        assert_eq!(confirm.asked(), 1);
        // Declining has no side effects.
        assert_eq!(client.remote_version().await.unwrap(), Version::new(3));
    }

    #[tokio::test]
    async fn accepted_conflict_pushes() {
        let client = new_project().await;
        for _ in 0..3 {
            client.push_unchecked(b"A=1\n", None).await.unwrap();
        }
        let confirm = CountingConfirm::new(Answer::Yes);
        let options = PushOptions {
            last_known: Version::new(1),
            ..Default::default()
        };
        let outcome = client.push(b"A=2\n", options, &confirm).await.unwrap();
        assert_eq!(outcome.version, Version::new(4));
        assert_eq!(confirm.asked(), 1);
    }

    #[tokio::test]
    async fn interrupted_conflict_prompt_cancels_push() {
        let client = new_project().await;
        for _ in 0..3 {
            client.push_unchecked(b"A=1\n", None).await.unwrap();
        }
        let confirm = CountingConfirm::new(Answer::Interrupted);
        let options = PushOptions {
            last_known: Version::new(1),
            ..Default::default()
        };

        let err = client.push(b"A=2\n", options, &confirm).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
        assert_eq!(client.remote_version().await.unwrap(), Version::new(3));
    }

    #[tokio::test]
    async fn force_skips_the_prompt() {
        let client = new_project().await;
        for _ in 0..3 {
            client.push_unchecked(b"A=1\n", None).await.unwrap();
        }
        let confirm = CountingConfirm::new(Answer::No);
        let options = PushOptions {
            last_known: Version::new(1),
            force: true,
            ..Default::default()
        };
        let outcome = client.push(b"A=2\n", options, &confirm).await.unwrap();
        assert_eq!(outcome.version, Version::new(4));
        assert_eq!(confirm.asked(), 0);
    }

    #[tokio::test]
    async fn failed_version_check_still_pushes() {
        let client = new_project().await;
        for _ in 0..3 {
            client.push_unchecked(b"A=1\n", None).await.unwrap();
        }
        client
            .relay()
            .fail_next_version(RelayError::Network("unreachable".into()));
        let confirm = CountingConfirm::new(Answer::No);
        let options = PushOptions {
            last_known: Version::new(1),
            ..Default::default()
        };
        let outcome = client.push(b"A=2\n", options, &confirm).await.unwrap();
        assert_eq!(outcome.version, Version::new(4));
        assert_eq!(confirm.asked(), 0);
    }

    // ===========================================
    // Rollback / History Tests
    // ===========================================

    #[tokio::test]
    async fn rollback_appends_old_content() {
        let client = new_project().await;
        client.push_unchecked(b"A=1\n", None).await.unwrap();
        client.push_unchecked(b"A=2\n", None).await.unwrap();

        let outcome = client
            .rollback(Version::new(1), PushOptions::default(), &yes())
            .await
            .unwrap();
        assert_eq!(outcome.version, Version::new(3));
        assert_eq!(client.pull().await.unwrap().plaintext, b"A=1\n");
        assert_eq!(client.fetch_version(Version::new(1)).await.unwrap(), b"A=1\n");
        assert_eq!(client.fetch_version(Version::new(2)).await.unwrap(), b"A=2\n");

        let history = client.history_all(10).await.unwrap();
        assert_eq!(history[2].message.as_deref(), Some("Rollback to v1"));
    }

    #[tokio::test]
    async fn restore_pushes_fetched_content_without_refetching() {
        let client = new_project().await;
        client.push_unchecked(b"A=1\n", None).await.unwrap();
        client.push_unchecked(b"A=2\n", None).await.unwrap();

        let content = client.fetch_version(Version::new(1)).await.unwrap();
        let options = PushOptions {
            last_known: Version::new(2),
            ..PushOptions::default()
        };
        let outcome = client
            .restore(Version::new(1), &content, options, &yes())
            .await
            .unwrap();

        assert_eq!(outcome.version, Version::new(3));
        assert_eq!(client.relay().calls("env_at"), 1);
        let history = client.history_all(10).await.unwrap();
        assert_eq!(history[2].message.as_deref(), Some("Rollback to v1"));
    }

    #[tokio::test]
    async fn rollback_to_missing_version_is_not_found() {
        let client = new_project().await;
        client.push_unchecked(b"A=1\n", None).await.unwrap();
        let err = client
            .rollback(Version::new(9), PushOptions::default(), &yes())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(client.remote_version().await.unwrap(), Version::new(1));
    }

    #[tokio::test]
    async fn history_all_walks_every_page() {
        let client = new_project().await;
        for i in 0..7 {
            client
                .push_unchecked(b"A=1\n", Some(format!("change {}", i)))
                .await
                .unwrap();
        }
        let first = client.history(1, 3).await.unwrap();
        assert_eq!(first.entries.len(), 3);
        assert_eq!(first.total, 7);

        let all = client.history_all(3).await.unwrap();
        let versions: Vec<u64> = all.iter().map(|e| e.version.value()).collect();
        assert_eq!(versions, (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn diff_against_remote() {
        let client = new_project().await;
        client.push_unchecked(b"B=3\nC=4\n", None).await.unwrap();

        let report = client.diff("A=1\nB=2\n").await.unwrap();
        assert_eq!(report.remote_version, Version::new(1));
        assert_eq!(report.diff.added, vec![("C".to_string(), "4".to_string())]);
        assert_eq!(report.diff.removed, vec![("A".to_string(), "1".to_string())]);
        assert_eq!(report.diff.changed.len(), 1);
    }

    // ===========================================
    // Membership Tests
    // ===========================================

    #[tokio::test]
    async fn invite_wraps_key_for_registered_invitee() {
        let alice = new_project().await;
        alice.push_unchecked(b"A=1\n", None).await.unwrap();

        let (bob_relay, bob_id) = registered(alice.relay().signup("bob@example.com")).await;
        let invite = alice.invite("bob@example.com").await.unwrap();
        assert!(invite.shared_immediately);

        bob_relay.accept_invitation(&invite.invitation.id).await.unwrap();
        let key = fetch_project_key(&bob_relay, alice.project(), &bob_id)
            .await
            .unwrap();
        assert_eq!(&key, alice.key());

        let bob = EnvClient::new(bob_relay, alice.project().clone(), key, bob_id);
        assert_eq!(bob.pull().await.unwrap().plaintext, b"A=1\n");
        // Nothing left pending for the next push.
        let outcome = alice.push_unchecked(b"A=2\n", None).await.unwrap();
        assert!(outcome.distribution.is_noop());
    }

    #[tokio::test]
    async fn unregistered_invitee_gets_key_on_next_push() {
        let alice = new_project().await;
        alice.push_unchecked(b"A=1\n", None).await.unwrap();

        let bob_relay = alice.relay().signup("bob@example.com");
        let invite = alice.invite("bob@example.com").await.unwrap();
        // No identity on the relay yet, so nothing to wrap for.
        assert!(!invite.shared_immediately);

        let (bob_relay, bob_id) = registered(bob_relay).await;
        bob_relay.accept_invitation(&invite.invitation.id).await.unwrap();
        let missing = EnvClient::open(
            bob_relay.clone(),
            alice.project().clone(),
            bob_id.clone(),
            None,
        )
        .await;
        assert!(matches!(missing, Err(ClientError::MissingProjectKey(_))));

        let outcome = alice.push_unchecked(b"A=2\n", None).await.unwrap();
        assert_eq!(outcome.distribution.shared, 1);

        let bob = EnvClient::open(bob_relay, alice.project().clone(), bob_id, None)
            .await
            .unwrap();
        assert_eq!(bob.pull().await.unwrap().plaintext, b"A=2\n");

        let members = alice.members().await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|m| m.has_key));
    }

    #[tokio::test]
    async fn partial_distribution_still_succeeds() {
        let alice = new_project().await;
        let bob_relay = alice.relay().signup("bob@example.com");
        let invite = alice.invite("bob@example.com").await.unwrap();
        let (bob_relay, _) = registered(bob_relay).await;
        bob_relay.accept_invitation(&invite.invitation.id).await.unwrap();

        alice.relay().fail_next_upload(RelayError::Timeout);
        let outcome = alice.push_unchecked(b"A=1\n", None).await.unwrap();
        assert_eq!(outcome.version, Version::new(1));
        assert!(outcome.distribution.is_partial());
    }

    #[tokio::test]
    async fn creator_recovers_key_after_reinstall() {
        let alice = new_project().await;
        alice.push_unchecked(b"A=1\n", None).await.unwrap();

        let reopened = EnvClient::open(
            alice.relay().clone(),
            alice.project().clone(),
            alice.identity().clone(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(reopened.key(), alice.key());
    }
}
