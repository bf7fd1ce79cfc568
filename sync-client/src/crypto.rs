//! Envelope cryptography for envsync.
//!
//! This module provides:
//! - Member identities: X25519 keypairs used for key agreement
//! - Project keys: 256-bit symmetric secrets, one per project
//! - XChaCha20-Poly1305 encryption of environment payloads under a project key
//! - crypto_box (X25519 + XSalsa20-Poly1305) wrapping of a project key per recipient
//!
//! # Security Notes
//!
//! - Both layers use 192-bit random nonces, safe for random generation
//! - Every output is `nonce || auth_ciphertext`, base64-encoded
//! - Any authentication failure (wrong key, swapped roles, tampering) is a hard
//!   error; garbage is never returned
//! - Secret material is zeroed on drop and redacted from Debug output

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use envsync_types::{
    EnvCiphertext, IdentityPublicKey, KeyEnvelope, SealedBlob, TypesError, NONCE_LEN,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Key size for project keys and identity secrets (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Nonce size for XChaCha20 and XSalsa20 (192 bits = 24 bytes).
pub const NONCE_SIZE: usize = NONCE_LEN;

/// Crypto errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Authentication tag did not verify: wrong key, wrong sender/recipient
    /// pair, or tampered ciphertext. The data must be rejected.
    #[error("authentication failed: wrong key or tampered ciphertext")]
    AuthenticationFailure,

    /// The sealed blob could not be decoded.
    #[error("malformed ciphertext: {0}")]
    MalformedBlob(#[from] TypesError),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// The OS random number generator failed.
    #[error("random number generation failed: {0}")]
    Random(String),
}

fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::Random(e.to_string()))?;
    Ok(bytes)
}

/// A member's long-lived X25519 keypair.
///
/// The secret half never leaves the workspace; only [`Identity::public_key`]
/// is registered with the relay.
#[derive(Clone)]
pub struct Identity {
    secret: SecretKey,
    public: IdentityPublicKey,
}

impl Identity {
    /// Generate a fresh identity from OS randomness.
    pub fn generate() -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(random_bytes::<KEY_SIZE>()?);
        Ok(Self::from_secret_bytes(*bytes))
    }

    /// Restore an identity from its persisted secret.
    pub fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = IdentityPublicKey::from_bytes(*secret.public_key().as_bytes());
        Self { secret, public }
    }

    /// Restore from a slice, checking the length.
    pub fn from_secret_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self::from_secret_bytes(arr))
    }

    /// The secret bytes, for persisting to owner-only storage.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// The public half, safe to publish.
    pub fn public_key(&self) -> IdentityPublicKey {
        self.public
    }

    /// Short human-comparable fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Identity {{ public: {:?}, secret: [REDACTED] }}", self.public)
    }
}

/// SHA-256 fingerprint of a public identity, as grouped hex (`ab12 cd34 ...`).
pub fn fingerprint(key: &IdentityPublicKey) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..16])
        .as_bytes()
        .chunks(4)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The symmetric secret protecting one project's environment.
///
/// Generated once at project creation. Every member holds an identical copy,
/// obtained by unwrapping a [`KeyEnvelope`] addressed to them.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ProjectKey([u8; KEY_SIZE]);

impl ProjectKey {
    /// Generate 256 bits of fresh randomness.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self(random_bytes::<KEY_SIZE>()?))
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

// Don't leak keys in debug output
impl std::fmt::Debug for ProjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProjectKey([REDACTED])")
    }
}

/// Encrypt an environment document under the project key.
///
/// A fresh random nonce is drawn on every call, so encrypting the same
/// plaintext twice never yields the same ciphertext.
pub fn encrypt_symmetric(plaintext: &[u8], key: &ProjectKey) -> Result<EnvCiphertext, CryptoError> {
    let nonce_bytes = random_bytes::<NONCE_SIZE>()?;
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed("aead encrypt failed".into()))?;

    Ok(EnvCiphertext::new(SealedBlob::seal(&nonce_bytes, &ciphertext)))
}

/// Verify and decrypt an environment document.
pub fn decrypt_symmetric(blob: &EnvCiphertext, key: &ProjectKey) -> Result<Vec<u8>, CryptoError> {
    let (nonce, ciphertext) = blob.as_sealed().open()?;
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    cipher
        .decrypt(XNonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| CryptoError::AuthenticationFailure)
}

/// Wrap a project key for one recipient.
///
/// The shared secret comes from X25519 between `sender`'s secret and the
/// recipient's public key; the key is then sealed with XSalsa20-Poly1305.
pub fn wrap_key(
    payload: &ProjectKey,
    recipient: &IdentityPublicKey,
    sender: &Identity,
) -> Result<KeyEnvelope, CryptoError> {
    let nonce_bytes = random_bytes::<NONCE_SIZE>()?;
    let salsa_box = SalsaBox::new(&PublicKey::from(*recipient.as_bytes()), &sender.secret);

    let wrapped = salsa_box
        .encrypt(crypto_box::Nonce::from_slice(&nonce_bytes), &payload.as_bytes()[..])
        .map_err(|_| CryptoError::EncryptionFailed("key wrapping failed".into()))?;

    Ok(KeyEnvelope::new(SealedBlob::seal(&nonce_bytes, &wrapped)))
}

/// Unwrap a project key addressed to `recipient`, sealed by `sender`.
///
/// Fails closed with [`CryptoError::AuthenticationFailure`] when the keys do
/// not match the ones used to wrap, including swapped sender/recipient roles.
pub fn unwrap_key(
    envelope: &KeyEnvelope,
    sender: &IdentityPublicKey,
    recipient: &Identity,
) -> Result<ProjectKey, CryptoError> {
    let (nonce, wrapped) = envelope.as_sealed().open()?;
    let salsa_box = SalsaBox::new(&PublicKey::from(*sender.as_bytes()), &recipient.secret);

    let unwrapped = Zeroizing::new(
        salsa_box
            .decrypt(crypto_box::Nonce::from_slice(&nonce), wrapped.as_slice())
            .map_err(|_| CryptoError::AuthenticationFailure)?,
    );

    ProjectKey::from_slice(&unwrapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================
    // Symmetric Layer Tests
    // ===========================================

    #[test]
    fn symmetric_roundtrip() {
        let key = ProjectKey::generate().unwrap();
        let plaintext = b"DATABASE_URL=postgres://localhost\nAPI_KEY=abc123\n";

        let blob = encrypt_symmetric(plaintext, &key).unwrap();
        let decrypted = decrypt_symmetric(&blob, &key).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn symmetric_uses_192_bit_nonce_prefix() {
        let key = ProjectKey::generate().unwrap();
        let blob = encrypt_symmetric(b"A=1", &key).unwrap();

        let (nonce, ciphertext) = blob.as_sealed().open().unwrap();
        assert_eq!(nonce.len(), 24, "Must use 192-bit nonces");
        // 3 bytes plaintext + 16 byte Poly1305 tag
        assert_eq!(ciphertext.len(), 3 + 16);
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let key = ProjectKey::generate().unwrap();
        let plaintext = b"SAME=value";

        let first = encrypt_symmetric(plaintext, &key).unwrap();
        let second = encrypt_symmetric(plaintext, &key).unwrap();

        assert_ne!(first, second);
        assert_eq!(decrypt_symmetric(&first, &key).unwrap(), plaintext);
        assert_eq!(decrypt_symmetric(&second, &key).unwrap(), plaintext);
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let key = ProjectKey::generate().unwrap();
        let other = ProjectKey::generate().unwrap();

        let blob = encrypt_symmetric(b"SECRET=1", &key).unwrap();
        let result = decrypt_symmetric(&blob, &other);

        assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = ProjectKey::generate().unwrap();
        let blob = encrypt_symmetric(b"SECRET=1", &key).unwrap();

        let (nonce, mut ciphertext) = blob.as_sealed().open().unwrap();
        ciphertext[0] ^= 0xFF;
        let tampered = EnvCiphertext::new(SealedBlob::seal(&nonce, &ciphertext));

        let result = decrypt_symmetric(&tampered, &key);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
    }

    #[test]
    fn truncated_blob_is_malformed() {
        let key = ProjectKey::generate().unwrap();
        let blob = EnvCiphertext::new(SealedBlob::from_encoded("AAAA"));
        assert!(matches!(
            decrypt_symmetric(&blob, &key),
            Err(CryptoError::MalformedBlob(_))
        ));
    }

    #[test]
    fn empty_plaintext_encrypts() {
        let key = ProjectKey::generate().unwrap();
        let blob = encrypt_symmetric(b"", &key).unwrap();
        assert!(decrypt_symmetric(&blob, &key).unwrap().is_empty());
    }

    #[test]
    fn large_plaintext_encrypts() {
        let key = ProjectKey::generate().unwrap();
        let plaintext = vec![b'x'; 1024 * 1024]; // 1 MiB

        let blob = encrypt_symmetric(&plaintext, &key).unwrap();
        assert_eq!(decrypt_symmetric(&blob, &key).unwrap(), plaintext);
    }

    // ===========================================
    // Key Wrapping Tests
    // ===========================================

    #[test]
    fn wrap_unwrap_roundtrip() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let key = ProjectKey::generate().unwrap();

        let envelope = wrap_key(&key, &bob.public_key(), &alice).unwrap();
        let unwrapped = unwrap_key(&envelope, &alice.public_key(), &bob).unwrap();

        assert_eq!(unwrapped, key);
    }

    #[test]
    fn self_wrap_roundtrip() {
        let alice = Identity::generate().unwrap();
        let key = ProjectKey::generate().unwrap();

        let envelope = wrap_key(&key, &alice.public_key(), &alice).unwrap();
        let unwrapped = unwrap_key(&envelope, &alice.public_key(), &alice).unwrap();

        assert_eq!(unwrapped, key);
    }

    #[test]
    fn swapped_roles_fail_authentication() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let key = ProjectKey::generate().unwrap();

        let envelope = wrap_key(&key, &bob.public_key(), &alice).unwrap();

        // Alice trying to open Bob's envelope with Bob as "sender"
        let result = unwrap_key(&envelope, &bob.public_key(), &alice);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
    }

    #[test]
    fn wrong_recipient_fails_authentication() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let eve = Identity::generate().unwrap();
        let key = ProjectKey::generate().unwrap();

        let envelope = wrap_key(&key, &bob.public_key(), &alice).unwrap();
        let result = unwrap_key(&envelope, &alice.public_key(), &eve);

        assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
    }

    #[test]
    fn wrong_sender_public_fails_authentication() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let eve = Identity::generate().unwrap();
        let key = ProjectKey::generate().unwrap();

        let envelope = wrap_key(&key, &bob.public_key(), &alice).unwrap();
        let result = unwrap_key(&envelope, &eve.public_key(), &bob);

        assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
    }

    #[test]
    fn three_recipients_get_distinct_envelopes() {
        let sender = Identity::generate().unwrap();
        let recipients: Vec<Identity> = (0..3).map(|_| Identity::generate().unwrap()).collect();
        let key = ProjectKey::generate().unwrap();

        let envelopes: Vec<KeyEnvelope> = recipients
            .iter()
            .map(|r| wrap_key(&key, &r.public_key(), &sender).unwrap())
            .collect();

        assert_ne!(envelopes[0], envelopes[1]);
        assert_ne!(envelopes[1], envelopes[2]);
        assert_ne!(envelopes[0], envelopes[2]);

        for (i, envelope) in envelopes.iter().enumerate() {
            for (j, recipient) in recipients.iter().enumerate() {
                let result = unwrap_key(envelope, &sender.public_key(), recipient);
                if i == j {
                    assert_eq!(result.unwrap(), key);
                } else {
                    assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
                }
            }
        }
    }

    // ===========================================
    // Identity Tests
    // ===========================================

    #[test]
    fn identities_do_not_collide() {
        let a = Identity::generate().unwrap();
        let b = Identity::generate().unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn identity_restores_from_secret() {
        let original = Identity::generate().unwrap();
        let restored = Identity::from_secret_bytes(*original.secret_bytes());
        assert_eq!(original.public_key(), restored.public_key());
    }

    #[test]
    fn identity_from_short_slice_fails() {
        assert!(matches!(
            Identity::from_secret_slice(&[0u8; 10]),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 10 })
        ));
    }

    #[test]
    fn fingerprint_is_stable_and_grouped() {
        let identity = Identity::generate().unwrap();
        let fp = identity.fingerprint();
        assert_eq!(fp, fingerprint(&identity.public_key()));
        assert_eq!(fp.split(' ').count(), 8);
    }

    #[test]
    fn debug_output_is_redacted() {
        let identity = Identity::generate().unwrap();
        let key = ProjectKey::generate().unwrap();
        assert!(format!("{:?}", identity).contains("REDACTED"));
        assert_eq!(format!("{:?}", key), "ProjectKey([REDACTED])");
    }
}
