//! Relay abstraction for envsync.
//!
//! The relay is an untrusted store: it keeps ciphertext, key envelopes and
//! membership, and hands out monotonically increasing versions. It never
//! sees a plaintext environment or a project key.
//!
//! # Design
//!
//! [`Relay`] is a capability interface exposing exactly the REST operations
//! the client needs. Implementations:
//! - [`HttpRelay`] - the real REST service over HTTPS
//! - [`MemoryRelay`] - an in-process relay for tests and demos
//!
//! Every call acts as the authenticated member the handle was built for.

mod http;
mod memory;

pub use http::{HttpRelay, HttpRelayConfig};
pub use memory::MemoryRelay;

use async_trait::async_trait;
use envsync_types::{
    EnvCiphertext, EnvSnapshot, HistoryPage, IdentityPublicKey, Invitation, KeyGrant, Member,
    MemberId, MemberIdentity, Project, ProjectId, Version,
};
use thiserror::Error;

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The relay rejected our credentials (HTTP 401).
    #[error("not authenticated: run `envsync login` again")]
    Unauthorized,

    /// No such project, snapshot, version, member or envelope.
    #[error("not found: {0}")]
    NotFound(String),

    /// The relay returned any other error status.
    #[error("relay error {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Message from the error body, if any.
        message: String,
    },

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl RelayError {
    /// Whether the caller should prompt for re-authentication.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Whether the target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// The operations an envsync relay offers.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Register (or re-register) the caller's public identity.
    async fn register_identity(&self, public_key: &IdentityPublicKey) -> Result<(), RelayError>;

    /// The authenticated member.
    async fn whoami(&self) -> Result<Member, RelayError>;

    /// `POST /projects` - create a project carrying the creator's self-wrapped key.
    async fn create_project(&self, name: &str, key: KeyGrant) -> Result<Project, RelayError>;

    /// `POST /projects/{id}/env` - append a snapshot; returns the assigned version.
    async fn push_env(
        &self,
        project: &ProjectId,
        ciphertext: EnvCiphertext,
        message: Option<String>,
    ) -> Result<Version, RelayError>;

    /// `GET /projects/{id}/env` - latest snapshot, `NotFound` if none exists.
    async fn pull_env(&self, project: &ProjectId) -> Result<EnvSnapshot, RelayError>;

    /// `GET /projects/{id}/env/version` - head version, `0` if none.
    async fn env_version(&self, project: &ProjectId) -> Result<Version, RelayError>;

    /// `GET /projects/{id}/env/{version}` - a historical snapshot.
    async fn env_at(&self, project: &ProjectId, version: Version)
        -> Result<EnvSnapshot, RelayError>;

    /// `GET /projects/{id}/env/history` - one page of snapshot metadata (1-based).
    async fn history(
        &self,
        project: &ProjectId,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, RelayError>;

    /// `GET /projects/{id}/members`.
    async fn list_members(&self, project: &ProjectId) -> Result<Vec<Member>, RelayError>;

    /// `GET /projects/{id}/members/pending-keys` - confirmed members without an envelope.
    async fn pending_keys(&self, project: &ProjectId) -> Result<Vec<MemberIdentity>, RelayError>;

    /// `POST /projects/{id}/members/{memberId}/key` - store an envelope for a member.
    async fn upload_member_key(
        &self,
        project: &ProjectId,
        member: &MemberId,
        grant: KeyGrant,
    ) -> Result<(), RelayError>;

    /// `GET /projects/{id}/members/me/key` - the caller's own envelope.
    async fn my_key(&self, project: &ProjectId) -> Result<KeyGrant, RelayError>;

    /// `POST /invitations`.
    async fn invite(&self, project: &ProjectId, email: &str) -> Result<Invitation, RelayError>;

    /// `POST /invitations/{id}/accept`.
    async fn accept_invitation(&self, invitation_id: &str) -> Result<Project, RelayError>;
}
