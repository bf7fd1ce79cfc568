//! Sealed blobs - the opaque `nonce || ciphertext` strings the relay stores.
//!
//! Both layers of envsync encryption produce the same shape: a fresh 192-bit
//! nonce followed by authenticated ciphertext, encoded as one base64 string.
//! [`EnvCiphertext`] and [`KeyEnvelope`] wrap [`SealedBlob`] so the two
//! cannot be mixed up at compile time.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// Nonce length for both XChaCha20 and XSalsa20 (192 bits = 24 bytes).
pub const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag length.
const TAG_LEN: usize = 16;

/// An opaque `nonce || auth_ciphertext` blob, base64-encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedBlob(String);

impl SealedBlob {
    /// Join a nonce and its ciphertext into one encoded blob.
    pub fn seal(nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Self {
        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(nonce);
        raw.extend_from_slice(ciphertext);
        Self(STANDARD.encode(raw))
    }

    /// Wrap an already-encoded blob (e.g. received from the relay).
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Split the blob back into its nonce prefix and ciphertext.
    ///
    /// Fails if the string is not base64 or is too short to hold a nonce
    /// and an authentication tag.
    pub fn open(&self) -> Result<([u8; NONCE_LEN], Vec<u8>), TypesError> {
        let raw = STANDARD
            .decode(&self.0)
            .map_err(|e| TypesError::InvalidEncoding(e.to_string()))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(TypesError::MalformedBlob { len: raw.len() });
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&raw[..NONCE_LEN]);
        Ok((nonce, raw[NONCE_LEN..].to_vec()))
    }

    /// The encoded form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SealedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedBlob([{} chars])", self.0.len())
    }
}

/// An environment document encrypted under a project key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvCiphertext(SealedBlob);

impl EnvCiphertext {
    /// Wrap a sealed blob.
    pub fn new(blob: SealedBlob) -> Self {
        Self(blob)
    }

    /// Borrow the underlying sealed blob.
    pub fn as_sealed(&self) -> &SealedBlob {
        &self.0
    }
}

impl fmt::Debug for EnvCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnvCiphertext({:?})", self.0)
    }
}

/// A project key wrapped for exactly one recipient identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyEnvelope(SealedBlob);

impl KeyEnvelope {
    /// Wrap a sealed blob.
    pub fn new(blob: SealedBlob) -> Self {
        Self(blob)
    }

    /// Borrow the underlying sealed blob.
    pub fn as_sealed(&self) -> &SealedBlob {
        &self.0
    }
}

impl fmt::Debug for KeyEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyEnvelope({:?})", self.0)
    }
}
