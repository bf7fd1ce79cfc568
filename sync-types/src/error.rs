//! Error types for envsync wire data.

use thiserror::Error;

/// Errors raised while decoding wire values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    /// Base64 decoding failed.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// A sealed blob is too short to contain a nonce and an auth tag.
    #[error("malformed sealed blob: {len} bytes")]
    MalformedBlob {
        /// Decoded length of the blob.
        len: usize,
    },

    /// A key had the wrong number of bytes.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// A version string was not a positive integer.
    #[error("invalid version: {0}")]
    InvalidVersion(String),
}
