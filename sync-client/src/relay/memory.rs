//! In-process relay for tests and demos.
//!
//! All handles created from one [`MemoryRelay`] share a single state, so a
//! test can act as several members against the same "server". Calls made
//! through a handle are authenticated as that handle's member.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use envsync_types::{
    EnvCiphertext, EnvSnapshot, HistoryEntry, HistoryPage, IdentityPublicKey, Invitation,
    KeyGrant, Member, MemberId, MemberIdentity, Project, ProjectId, Version,
};

use super::{Relay, RelayError};

/// In-memory relay.
///
/// Allows scripting failures (`fail_next_*`) and inspecting stored state.
#[derive(Debug, Clone)]
pub struct MemoryRelay {
    state: Arc<Mutex<RelayState>>,
    member: MemberId,
}

#[derive(Debug, Default)]
struct RelayState {
    accounts: Vec<Account>,
    projects: HashMap<ProjectId, ProjectRecord>,
    invitations: HashMap<String, Invitation>,
    fail_next: HashMap<&'static str, RelayError>,
    calls: HashMap<&'static str, usize>,
}

#[derive(Debug, Clone)]
struct Account {
    id: MemberId,
    email: String,
    public_key: Option<IdentityPublicKey>,
}

#[derive(Debug)]
struct ProjectRecord {
    name: String,
    snapshots: Vec<EnvSnapshot>,
    members: Vec<MemberId>,
    keys: HashMap<MemberId, KeyGrant>,
}

impl RelayState {
    fn account(&self, id: &MemberId) -> Result<&Account, RelayError> {
        self.accounts
            .iter()
            .find(|a| &a.id == id)
            .ok_or(RelayError::Unauthorized)
    }

    fn account_by_email(&self, email: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.email == email)
    }

    fn take_failure(&mut self, op: &'static str) -> Result<(), RelayError> {
        *self.calls.entry(op).or_default() += 1;
        match self.fail_next.remove(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Project the caller belongs to.
    fn project_for(
        &mut self,
        project: &ProjectId,
        caller: &MemberId,
    ) -> Result<&mut ProjectRecord, RelayError> {
        let record = self
            .projects
            .get_mut(project)
            .ok_or_else(|| RelayError::NotFound(format!("project {}", project)))?;
        if !record.members.contains(caller) {
            return Err(RelayError::Http {
                status: 403,
                message: format!("not a member of project {}", project),
            });
        }
        Ok(record)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl MemoryRelay {
    /// Start an empty relay with one signed-up member and return their handle.
    pub fn new(email: &str) -> Self {
        let state = Arc::new(Mutex::new(RelayState::default()));
        let member = Self::create_account(&state, email);
        Self { state, member }
    }

    /// Sign up another member on the same relay and return their handle.
    pub fn signup(&self, email: &str) -> Self {
        let member = Self::create_account(&self.state, email);
        Self {
            state: Arc::clone(&self.state),
            member,
        }
    }

    /// A handle acting as an existing member.
    pub fn as_member(&self, member: &MemberId) -> Self {
        Self {
            state: Arc::clone(&self.state),
            member: member.clone(),
        }
    }

    fn create_account(state: &Arc<Mutex<RelayState>>, email: &str) -> MemberId {
        let id = MemberId::new(new_id());
        let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
        guard.accounts.push(Account {
            id: id.clone(),
            email: email.to_string(),
            public_key: None,
        });
        id
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The member this handle acts as.
    pub fn member_id(&self) -> &MemberId {
        &self.member
    }

    /// Number of snapshots stored for a project.
    pub fn snapshot_count(&self, project: &ProjectId) -> usize {
        self.lock()
            .projects
            .get(project)
            .map(|p| p.snapshots.len())
            .unwrap_or(0)
    }

    /// Number of key envelopes stored for a project.
    pub fn envelope_count(&self, project: &ProjectId) -> usize {
        self.lock()
            .projects
            .get(project)
            .map(|p| p.keys.len())
            .unwrap_or(0)
    }

    /// How many times `op` (e.g. `"env_at"`) has been called on this relay.
    pub fn calls(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Cause the next `push_env` to fail.
    pub fn fail_next_push(&self, err: RelayError) {
        self.lock().fail_next.insert("push_env", err);
    }

    /// Cause the next `pull_env` to fail.
    pub fn fail_next_pull(&self, err: RelayError) {
        self.lock().fail_next.insert("pull_env", err);
    }

    /// Cause the next `env_version` to fail.
    pub fn fail_next_version(&self, err: RelayError) {
        self.lock().fail_next.insert("env_version", err);
    }

    /// Cause the next `upload_member_key` to fail.
    pub fn fail_next_upload(&self, err: RelayError) {
        self.lock().fail_next.insert("upload_member_key", err);
    }

    /// Cause the next `pending_keys` to fail.
    pub fn fail_next_pending(&self, err: RelayError) {
        self.lock().fail_next.insert("pending_keys", err);
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn register_identity(&self, public_key: &IdentityPublicKey) -> Result<(), RelayError> {
        let mut state = self.lock();
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.id == self.member)
            .ok_or(RelayError::Unauthorized)?;
        account.public_key = Some(*public_key);
        Ok(())
    }

    async fn whoami(&self) -> Result<Member, RelayError> {
        let state = self.lock();
        let account = state.account(&self.member)?;
        Ok(Member {
            id: account.id.clone(),
            email: account.email.clone(),
            public_key: account.public_key,
            has_key: false,
        })
    }

    async fn create_project(&self, name: &str, key: KeyGrant) -> Result<Project, RelayError> {
        let mut state = self.lock();
        state.account(&self.member)?;
        let id = ProjectId::new(new_id());
        let mut keys = HashMap::new();
        keys.insert(self.member.clone(), key);
        state.projects.insert(
            id.clone(),
            ProjectRecord {
                name: name.to_string(),
                snapshots: Vec::new(),
                members: vec![self.member.clone()],
                keys,
            },
        );
        Ok(Project {
            id,
            name: name.to_string(),
        })
    }

    async fn push_env(
        &self,
        project: &ProjectId,
        ciphertext: EnvCiphertext,
        message: Option<String>,
    ) -> Result<Version, RelayError> {
        let mut state = self.lock();
        state.take_failure("push_env")?;
        let author = state.account(&self.member)?.email.clone();
        let record = state.project_for(project, &self.member)?;
        let version = Version::new(record.snapshots.len() as u64 + 1);
        record.snapshots.push(EnvSnapshot {
            version,
            ciphertext,
            message,
            author: Some(author),
            created_at: now_secs(),
        });
        Ok(version)
    }

    async fn pull_env(&self, project: &ProjectId) -> Result<EnvSnapshot, RelayError> {
        let mut state = self.lock();
        state.take_failure("pull_env")?;
        let record = state.project_for(project, &self.member)?;
        record
            .snapshots
            .last()
            .cloned()
            .ok_or_else(|| RelayError::NotFound("no environment pushed yet".into()))
    }

    async fn env_version(&self, project: &ProjectId) -> Result<Version, RelayError> {
        let mut state = self.lock();
        state.take_failure("env_version")?;
        let record = state.project_for(project, &self.member)?;
        Ok(Version::new(record.snapshots.len() as u64))
    }

    async fn env_at(
        &self,
        project: &ProjectId,
        version: Version,
    ) -> Result<EnvSnapshot, RelayError> {
        let mut state = self.lock();
        state.take_failure("env_at")?;
        let record = state.project_for(project, &self.member)?;
        record
            .snapshots
            .iter()
            .find(|s| s.version == version)
            .cloned()
            .ok_or_else(|| RelayError::NotFound(format!("version {}", version)))
    }

    async fn history(
        &self,
        project: &ProjectId,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, RelayError> {
        let mut state = self.lock();
        let record = state.project_for(project, &self.member)?;
        let limit = limit.max(1);
        let page = page.max(1);
        let skip = (page as usize - 1).saturating_mul(limit as usize);
        let entries = record
            .snapshots
            .iter()
            .skip(skip)
            .take(limit as usize)
            .map(|s| HistoryEntry {
                version: s.version,
                message: s.message.clone(),
                author: s.author.clone(),
                created_at: s.created_at,
            })
            .collect();
        Ok(HistoryPage {
            entries,
            total: record.snapshots.len() as u64,
            page,
            limit,
        })
    }

    async fn list_members(&self, project: &ProjectId) -> Result<Vec<Member>, RelayError> {
        let mut state = self.lock();
        let (ids, keyed): (Vec<MemberId>, Vec<bool>) = {
            let record = state.project_for(project, &self.member)?;
            record
                .members
                .iter()
                .map(|m| (m.clone(), record.keys.contains_key(m)))
                .unzip()
        };
        ids.into_iter()
            .zip(keyed)
            .map(|(id, has_key)| {
                let account = state.account(&id)?;
                Ok(Member {
                    id,
                    email: account.email.clone(),
                    public_key: account.public_key,
                    has_key,
                })
            })
            .collect()
    }

    async fn pending_keys(&self, project: &ProjectId) -> Result<Vec<MemberIdentity>, RelayError> {
        let mut state = self.lock();
        state.take_failure("pending_keys")?;
        let pending: Vec<MemberId> = {
            let record = state.project_for(project, &self.member)?;
            record
                .members
                .iter()
                .filter(|m| !record.keys.contains_key(*m))
                .cloned()
                .collect()
        };
        // Members without a registered identity cannot receive a key yet.
        Ok(pending
            .into_iter()
            .filter_map(|id| {
                let public_key = state.account(&id).ok()?.public_key?;
                Some(MemberIdentity {
                    member_id: id,
                    public_key,
                })
            })
            .collect())
    }

    async fn upload_member_key(
        &self,
        project: &ProjectId,
        member: &MemberId,
        grant: KeyGrant,
    ) -> Result<(), RelayError> {
        let mut state = self.lock();
        state.take_failure("upload_member_key")?;
        // Envelopes for invitees are held until they accept.
        let invited = state.invitations.values().any(|inv| {
            &inv.project_id == project
                && inv.invitee.as_ref().map(|i| &i.member_id) == Some(member)
        });
        let record = state.project_for(project, &self.member)?;
        if !record.members.contains(member) && !invited {
            return Err(RelayError::NotFound(format!("member {}", member)));
        }
        record.keys.entry(member.clone()).or_insert(grant);
        Ok(())
    }

    async fn my_key(&self, project: &ProjectId) -> Result<KeyGrant, RelayError> {
        let mut state = self.lock();
        let record = state.project_for(project, &self.member)?;
        record
            .keys
            .get(&self.member)
            .cloned()
            .ok_or_else(|| RelayError::NotFound("no key shared with you yet".into()))
    }

    async fn invite(&self, project: &ProjectId, email: &str) -> Result<Invitation, RelayError> {
        let mut state = self.lock();
        state.project_for(project, &self.member)?;
        let invitee = state.account_by_email(email).and_then(|a| {
            a.public_key.map(|public_key| MemberIdentity {
                member_id: a.id.clone(),
                public_key,
            })
        });
        let invitation = Invitation {
            id: new_id(),
            project_id: project.clone(),
            email: email.to_string(),
            invitee,
        };
        state
            .invitations
            .insert(invitation.id.clone(), invitation.clone());
        Ok(invitation)
    }

    async fn accept_invitation(&self, invitation_id: &str) -> Result<Project, RelayError> {
        let mut state = self.lock();
        let email = state.account(&self.member)?.email.clone();
        let invitation = state
            .invitations
            .get(invitation_id)
            .cloned()
            .ok_or_else(|| RelayError::NotFound(format!("invitation {}", invitation_id)))?;
        if invitation.email != email {
            return Err(RelayError::Http {
                status: 403,
                message: "invitation was issued to another email".into(),
            });
        }
        state.invitations.remove(invitation_id);
        let record = state
            .projects
            .get_mut(&invitation.project_id)
            .ok_or_else(|| RelayError::NotFound(format!("project {}", invitation.project_id)))?;
        if !record.members.contains(&self.member) {
            record.members.push(self.member.clone());
        }
        Ok(Project {
            id: invitation.project_id,
            name: record.name.clone(),
        })
    }
}
