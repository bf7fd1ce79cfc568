//! # envsync-types
//!
//! Wire types shared between envsync clients and the relay.
//!
//! This crate provides the foundational types used across all envsync crates:
//! - [`ProjectId`], [`MemberId`], [`Version`] - Identity and ordering types
//! - [`IdentityPublicKey`] - The public half of a member identity
//! - [`SealedBlob`], [`EnvCiphertext`], [`KeyEnvelope`] - Opaque `nonce || ciphertext` blobs
//! - Request and response bodies for the relay REST contract
//! - [`TypesError`] - Error types
//!
//! Nothing in here ever holds plaintext. The relay only sees these types.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod ids;
mod messages;

pub use envelope::{EnvCiphertext, KeyEnvelope, SealedBlob, NONCE_LEN};
pub use error::TypesError;
pub use ids::{IdentityPublicKey, MemberId, ProjectId, Version, PUBLIC_KEY_LEN};
pub use messages::{
    CreateProjectRequest, EnvSnapshot, ErrorBody, HistoryEntry, HistoryPage, Invitation,
    InviteRequest, KeyGrant, Member, MemberIdentity, Project, PushEnvRequest, PushEnvResponse,
    RegisterIdentityRequest, VersionResponse,
};
