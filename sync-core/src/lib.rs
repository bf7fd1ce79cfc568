//! # envsync-core
//!
//! Pure logic for envsync (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms for environment
//! sync without any network or disk I/O, enabling fast unit tests.
//!
//! ## Modules
//!
//! - [`diff`] - parse `KEY=VALUE` documents and compute added/removed/changed keys
//! - [`versioning`] - advisory conflict gate and history page walking
//! - [`watch`] - the watch-mode state machine
//!
//! The actual I/O (relay calls, file writes, prompts) is performed by
//! `envsync-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod versioning;
pub mod watch;

pub use diff::{diff, diff_documents, parse_env, ChangedEntry, EnvDiff, EnvMap};
pub use versioning::{check_conflict, ConflictCheck, HistoryWalk};
pub use watch::{WatchAction, WatchEvent, WatchNotice, WatchPhase, WatchSession};
