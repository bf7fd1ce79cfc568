//! Watch-mode state machine for envsync.
//!
//! This module provides a pure, side-effect-free state machine for keeping a
//! local plaintext mirror in sync with the relay. It takes events as input
//! (timer ticks, local file changes, results of I/O) and produces a new
//! session plus a list of actions to execute.
//!
//! The actual I/O (version checks, pulls, prompts, pushes, file watching) is
//! performed by envsync-client, which feeds the outcome of each action back
//! in as an event. One task drives the machine serially, so at most one
//! push or pull sequence runs at a time.
//!
//! ```text
//!            Tick / RemoteVersion(v > local)
//!   ┌──────┐ ──────────────────────────────► ApplyingRemoteUpdate
//!   │ Idle │ ◄────────────────────────────── (RemoteApplied / RemoteApplyFailed)
//!   └──────┘
//!      │ LocalChanged
//!      ▼
//!   AwaitingPushConfirmation ──PushConfirmed──► Pushing ──PushSucceeded/Failed──► Idle
//!      └──────PushDeclined──────────────────────────────────────────────────────► Idle
//! ```
//!
//! While any phase other than `Idle` is active, ticks and local changes are
//! ignored.

use envsync_types::Version;

/// The phase the watch loop is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    /// Waiting for a tick or a local change.
    Idle,
    /// A push confirmation prompt is open.
    AwaitingPushConfirmation,
    /// Encrypting and uploading the local mirror.
    Pushing,
    /// Pulling a newer remote snapshot and overwriting the mirror.
    ApplyingRemoteUpdate {
        /// Remote version being applied.
        target: Version,
    },
    /// Shut down; all further events are ignored.
    Stopped,
}

/// Watch session state - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSession {
    phase: WatchPhase,
    local_version: Version,
}

impl WatchSession {
    /// Start an idle session that knows about `local_version`.
    pub fn new(local_version: Version) -> Self {
        Self {
            phase: WatchPhase::Idle,
            local_version,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    /// Last version applied to or pushed from the mirror.
    pub fn local_version(&self) -> Version {
        self.local_version
    }

    /// Whether a push, prompt or remote apply is in flight.
    pub fn is_busy(&self) -> bool {
        !matches!(self.phase, WatchPhase::Idle | WatchPhase::Stopped)
    }

    /// Whether the session has shut down.
    pub fn is_stopped(&self) -> bool {
        matches!(self.phase, WatchPhase::Stopped)
    }

    /// Process an event and return the new session plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller is responsible
    /// for executing the returned actions in order.
    pub fn on_event(self, event: WatchEvent) -> (Self, Vec<WatchAction>) {
        let local = self.local_version;
        match (self.phase, event) {
            // Shutdown wins from every live phase
            (WatchPhase::Stopped, _) => (self, vec![]),
            (_, WatchEvent::ShutdownRequested) => (
                self.with_phase(WatchPhase::Stopped),
                vec![WatchAction::StopTimer, WatchAction::ReleaseLocalWatch],
            ),

            // From Idle
            (WatchPhase::Idle, WatchEvent::Tick) => (self, vec![WatchAction::CheckRemoteVersion]),
            (WatchPhase::Idle, WatchEvent::RemoteVersion { version }) if version > local => (
                self.with_phase(WatchPhase::ApplyingRemoteUpdate { target: version }),
                vec![WatchAction::SuspendLocalWatch, WatchAction::PullRemote],
            ),
            (WatchPhase::Idle, WatchEvent::LocalChanged) => (
                self.with_phase(WatchPhase::AwaitingPushConfirmation),
                vec![WatchAction::PromptPush],
            ),

            // From ApplyingRemoteUpdate
            (WatchPhase::ApplyingRemoteUpdate { .. }, WatchEvent::RemoteApplied { version }) => (
                Self {
                    phase: WatchPhase::Idle,
                    local_version: version,
                },
                vec![
                    WatchAction::ResumeLocalWatch,
                    WatchAction::Emit(WatchNotice::Pulled { version }),
                ],
            ),
            (WatchPhase::ApplyingRemoteUpdate { .. }, WatchEvent::RemoteApplyFailed { error }) => (
                self.with_phase(WatchPhase::Idle),
                vec![
                    WatchAction::ResumeLocalWatch,
                    WatchAction::Emit(WatchNotice::PullFailed { error }),
                ],
            ),

            // From AwaitingPushConfirmation
            (WatchPhase::AwaitingPushConfirmation, WatchEvent::PushConfirmed) => (
                self.with_phase(WatchPhase::Pushing),
                vec![WatchAction::PushLocal],
            ),
            (WatchPhase::AwaitingPushConfirmation, WatchEvent::PushDeclined) => (
                self.with_phase(WatchPhase::Idle),
                vec![WatchAction::Emit(WatchNotice::PushDeclined)],
            ),

            // From Pushing
            (WatchPhase::Pushing, WatchEvent::PushSucceeded { version }) => (
                Self {
                    phase: WatchPhase::Idle,
                    local_version: version,
                },
                vec![WatchAction::Emit(WatchNotice::Pushed { version })],
            ),
            (WatchPhase::Pushing, WatchEvent::PushFailed { error }) => (
                self.with_phase(WatchPhase::Idle),
                vec![WatchAction::Emit(WatchNotice::PushFailed { error })],
            ),

            // Busy or stale - stay in current state
            (_, _) => (self, vec![]),
        }
    }

    fn with_phase(self, phase: WatchPhase) -> Self {
        Self { phase, ..self }
    }
}

/// Events that drive the watch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The poll timer fired.
    Tick,
    /// The relay reported its current version.
    RemoteVersion {
        /// Head version on the relay.
        version: Version,
    },
    /// The remote snapshot was decrypted and written to the mirror.
    RemoteApplied {
        /// Version that was written.
        version: Version,
    },
    /// Pulling or writing the remote snapshot failed.
    RemoteApplyFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The mirror file was modified by someone other than the loop.
    LocalChanged,
    /// The user accepted the push prompt.
    PushConfirmed,
    /// The user declined the push prompt.
    PushDeclined,
    /// The push completed and the relay assigned a version.
    PushSucceeded {
        /// Newly assigned version.
        version: Version,
    },
    /// The push failed.
    PushFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// External interrupt.
    ShutdownRequested,
}

/// Actions to be executed by the watch driver.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Ask the relay for its head version; answer with `RemoteVersion`.
    CheckRemoteVersion,
    /// Stop reacting to mirror file events.
    SuspendLocalWatch,
    /// Pull, decrypt and overwrite the mirror; answer with `RemoteApplied`
    /// or `RemoteApplyFailed`.
    PullRemote,
    /// Resume reacting to mirror file events, discarding any queued ones.
    ResumeLocalWatch,
    /// Ask the user whether to push; answer with `PushConfirmed` or `PushDeclined`.
    PromptPush,
    /// Encrypt and push the mirror; answer with `PushSucceeded` or `PushFailed`.
    PushLocal,
    /// Cancel the poll timer.
    StopTimer,
    /// Release the file watch.
    ReleaseLocalWatch,
    /// Report something to the user.
    Emit(WatchNotice),
}

/// User-facing outcomes of the watch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchNotice {
    /// A remote update was written to the mirror.
    Pulled {
        /// Version written.
        version: Version,
    },
    /// Local changes were pushed.
    Pushed {
        /// Version assigned.
        version: Version,
    },
    /// The user chose not to push.
    PushDeclined,
    /// A remote update could not be applied.
    PullFailed {
        /// Error message.
        error: String,
    },
    /// A push failed.
    PushFailed {
        /// Error message.
        error: String,
    },
}
