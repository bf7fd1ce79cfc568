//! # envsync-client
//!
//! Client library for envsync, end-to-end encrypted environment sync.
//!
//! This is the library the `envsync` CLI (and any other front end) builds on.
//!
//! ## Features
//!
//! - **E2E Encryption**: XChaCha20-Poly1305 payloads, crypto_box key envelopes
//! - **Relay Abstraction**: Pluggable relay (HTTPS, in-memory)
//! - **Key Distribution**: Best-effort sharing with members waiting for a key
//! - **Watch Mode**: Keeps a local mirror file in sync, driven by the pure
//!   state machine in envsync-core
//!
//! ## Example
//!
//! ```ignore
//! use envsync_client::{EnvClient, HttpRelay, HttpRelayConfig, PushOptions, AutoConfirm};
//!
//! let relay = HttpRelay::new(HttpRelayConfig::new(api_url, &token))?;
//! let client = EnvClient::open(relay, project_id, identity, None).await?;
//!
//! client.push(b"API_KEY=abc\n", PushOptions::default(), &AutoConfirm(true)).await?;
//! let pulled = client.pull().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod crypto;
pub mod keys;
pub mod mirror;
pub mod relay;
pub mod watch;

pub use client::{
    Answer, AutoConfirm, ClientError, Confirm, DiffReport, EnvClient, InviteOutcome, PullOutcome,
    PushOptions, PushOutcome,
};
pub use crypto::{
    decrypt_symmetric, encrypt_symmetric, fingerprint, unwrap_key, wrap_key, CryptoError,
    Identity, ProjectKey, KEY_SIZE, NONCE_SIZE,
};
pub use keys::{fetch_project_key, sync_pending_keys, DistributionReport, KeyFetchError};
pub use mirror::{FileMirror, MirrorError, MirrorWatch};
pub use relay::{HttpRelay, HttpRelayConfig, MemoryRelay, Relay, RelayError};
pub use watch::{WatchConfig, WatchError, WatchLoop, WatchSummary};
