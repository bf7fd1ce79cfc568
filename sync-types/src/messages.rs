//! Request and response bodies for the relay REST contract.
//!
//! All bodies are JSON. Ciphertext and key envelopes travel as opaque
//! base64 strings; the relay never receives plaintext or a project key.

use serde::{Deserialize, Serialize};

use crate::{EnvCiphertext, IdentityPublicKey, KeyEnvelope, MemberId, ProjectId, Version};

/// `POST /identity` - register the caller's public identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterIdentityRequest {
    /// The member's X25519 public key.
    pub public_key: IdentityPublicKey,
}

/// A member as the relay sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Relay-assigned member id.
    pub id: MemberId,
    /// Account email.
    pub email: String,
    /// Registered identity, if the member has logged in from a workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<IdentityPublicKey>,
    /// Whether a key envelope is recorded for this member in the project.
    #[serde(default)]
    pub has_key: bool,
}

/// A member id paired with its public identity.
///
/// Returned by `.../pending-keys` and attached to invitations when the
/// invitee has already registered an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberIdentity {
    /// The member.
    pub member_id: MemberId,
    /// Their registered public key.
    pub public_key: IdentityPublicKey,
}

/// A project key envelope plus the public key of whoever sealed it.
///
/// The recipient needs the sender's public key to derive the shared secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGrant {
    /// The wrapped project key.
    pub envelope: KeyEnvelope,
    /// Public identity of the member that wrapped it.
    pub sender_public_key: IdentityPublicKey,
}

/// `POST /projects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    /// Human-readable project name.
    pub name: String,
    /// The creator's self-wrapped project key.
    pub key: KeyGrant,
}

/// A project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Relay-assigned id.
    pub id: ProjectId,
    /// Human-readable name.
    pub name: String,
}

/// `POST /projects/{id}/env`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEnvRequest {
    /// The encrypted environment document.
    pub ciphertext: EnvCiphertext,
    /// Optional free-text description of the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response to a push: the version the relay assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEnvResponse {
    /// Newly assigned version.
    pub version: Version,
}

/// `GET /projects/{id}/env/version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResponse {
    /// Current head version (`0` when nothing was pushed yet).
    pub version: Version,
}

/// One immutable, versioned, encrypted environment document.
///
/// Returned by `GET /projects/{id}/env` (head) and
/// `GET /projects/{id}/env/{version}` (historical).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSnapshot {
    /// Snapshot version.
    pub version: Version,
    /// Encrypted document.
    pub ciphertext: EnvCiphertext,
    /// Optional change message.
    #[serde(default)]
    pub message: Option<String>,
    /// Optional author (email or member id).
    #[serde(default)]
    pub author: Option<String>,
    /// Unix timestamp (seconds) at which the relay stored the snapshot.
    #[serde(default)]
    pub created_at: u64,
}

/// Metadata for one snapshot in the history listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Snapshot version.
    pub version: Version,
    /// Optional change message.
    #[serde(default)]
    pub message: Option<String>,
    /// Optional author.
    #[serde(default)]
    pub author: Option<String>,
    /// Unix timestamp (seconds).
    #[serde(default)]
    pub created_at: u64,
}

/// `GET /projects/{id}/env/history?page=&limit=`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Entries on this page.
    pub entries: Vec<HistoryEntry>,
    /// Total number of snapshots in the project.
    pub total: u64,
    /// 1-based page number.
    pub page: u32,
    /// Page size used by the relay.
    pub limit: u32,
}

/// `POST /invitations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteRequest {
    /// Project to invite into.
    pub project_id: ProjectId,
    /// Invitee's email.
    pub email: String,
}

/// A pending invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    /// Invitation id, handed to the invitee out of band.
    pub id: String,
    /// Project the invitation is for.
    pub project_id: ProjectId,
    /// Invitee's email.
    pub email: String,
    /// Present when the invitee already has a registered identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitee: Option<MemberIdentity>,
}

/// Structured error body returned with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}
