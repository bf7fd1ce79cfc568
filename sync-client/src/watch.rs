//! Watch-mode driver.
//!
//! Runs the [`WatchSession`] state machine from envsync-core against a real
//! client, mirror file and prompt. One task reads events serially from three
//! sources: the shutdown future, the poll timer and the mirror change
//! channel. While a prompt, push or pull is in flight, new change
//! notifications are drained and dropped and the timer is not polled, so a
//! remote overwrite and a local push can never interleave.
//!
//! ```ignore
//! let (tx, rx) = mpsc::channel(1);
//! let mirror = FileMirror::start(&path, debounce, tx)?;
//! let summary = WatchLoop::new(&client, &confirm, mirror, rx, &path, WatchConfig::default())
//!     .run(tokio::signal::ctrl_c().map(|_| ()), |notice| println!("{notice:?}"))
//!     .await?;
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use envsync_core::{WatchAction, WatchEvent, WatchNotice, WatchSession};
use envsync_types::Version;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::{Answer, ClientError, Confirm, EnvClient};
use crate::mirror::MirrorWatch;
use crate::relay::Relay;

/// Watch loop errors that end the session.
#[derive(Debug, Error)]
pub enum WatchError {
    /// A relay call failed in a way retrying cannot fix.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Timing for the watch loop.
#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    /// How often to ask the relay for its head version.
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// What a finished session did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Remote updates written to the mirror.
    pub pulls: usize,
    /// Local changes pushed.
    pub pushes: usize,
    /// Version the mirror was at when the loop stopped.
    pub last_version: Version,
}

type Digest32 = [u8; 32];

fn digest(bytes: &[u8]) -> Digest32 {
    Sha256::digest(bytes).into()
}

/// Why a pull or push step did not complete.
#[derive(Debug)]
enum StepFailure {
    /// Ends the session: wrong key, revoked token.
    Fatal(ClientError),
    /// Reported and retried on the next tick.
    Retry(String),
}

impl From<ClientError> for StepFailure {
    fn from(e: ClientError) -> Self {
        if e.is_authentication_failure() || e.is_unauthorized() {
            Self::Fatal(e)
        } else {
            Self::Retry(e.to_string())
        }
    }
}

/// A watch session over one mirror file.
pub struct WatchLoop<'a, R: Relay, M: MirrorWatch> {
    client: &'a EnvClient<R>,
    confirm: &'a dyn Confirm,
    mirror: M,
    changes: mpsc::Receiver<()>,
    path: PathBuf,
    config: WatchConfig,
    initial_version: Version,
}

impl<'a, R: Relay, M: MirrorWatch> WatchLoop<'a, R, M> {
    /// Create a loop; `changes` must be fed by `mirror`.
    pub fn new(
        client: &'a EnvClient<R>,
        confirm: &'a dyn Confirm,
        mirror: M,
        changes: mpsc::Receiver<()>,
        path: &Path,
        config: WatchConfig,
    ) -> Self {
        Self {
            client,
            confirm,
            mirror,
            changes,
            path: path.to_path_buf(),
            config,
            initial_version: Version::zero(),
        }
    }

    /// Version the mirror is known to hold at start.
    pub fn starting_at(mut self, version: Version) -> Self {
        self.initial_version = version;
        self
    }

    /// Run until `shutdown` resolves. `on_notice` sees every user-facing outcome.
    pub async fn run<F, N>(mut self, shutdown: F, mut on_notice: N) -> Result<WatchSummary, WatchError>
    where
        F: Future<Output = ()>,
        N: FnMut(&WatchNotice),
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut session = WatchSession::new(self.initial_version);
        let mut summary = WatchSummary::default();
        let mut last_synced = tokio::fs::read(&self.path).await.ok().map(|b| digest(&b));
        let mut queue: VecDeque<WatchEvent> = VecDeque::new();

        info!(
            path = %self.path.display(),
            version = %session.local_version(),
            interval = ?self.config.poll_interval,
            "watching for changes"
        );

        while !session.is_stopped() {
            let event = match queue.pop_front() {
                Some(event) => event,
                None => tokio::select! {
                    _ = &mut shutdown => WatchEvent::ShutdownRequested,
                    _ = ticker.tick() => WatchEvent::Tick,
                    Some(()) = self.changes.recv() => {
                        match tokio::fs::read(&self.path).await {
                            Ok(bytes) if Some(digest(&bytes)) == last_synced => {
                                debug!("mirror unchanged since last sync");
                                continue;
                            }
                            Ok(_) => WatchEvent::LocalChanged,
                            Err(e) => {
                                debug!(error = %e, "mirror unreadable, ignoring change");
                                continue;
                            }
                        }
                    }
                },
            };

            let (next, actions) = session.on_event(event);
            session = next;

            for action in actions {
                let follow = match action {
                    WatchAction::CheckRemoteVersion => {
                        let client = self.client;
                        match guarded(shutdown.as_mut(), &mut self.changes, client.remote_version())
                            .await
                        {
                            None => Some(WatchEvent::ShutdownRequested),
                            Some(Ok(version)) => Some(WatchEvent::RemoteVersion { version }),
                            Some(Err(e)) if e.is_unauthorized() => {
                                self.mirror.release();
                                return Err(e.into());
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "version check failed");
                                None
                            }
                        }
                    }
                    WatchAction::SuspendLocalWatch => {
                        if let Err(e) = self.mirror.suspend() {
                            warn!(error = %e, "could not suspend mirror watch");
                        }
                        None
                    }
                    WatchAction::PullRemote => {
                        let fut = apply_remote(self.client, &self.path);
                        match guarded(shutdown.as_mut(), &mut self.changes, fut).await {
                            None => Some(WatchEvent::ShutdownRequested),
                            Some(Ok((version, written))) => {
                                last_synced = Some(written);
                                summary.pulls += 1;
                                Some(WatchEvent::RemoteApplied { version })
                            }
                            Some(Err(StepFailure::Fatal(e))) => {
                                self.mirror.release();
                                return Err(e.into());
                            }
                            Some(Err(StepFailure::Retry(error))) => {
                                Some(WatchEvent::RemoteApplyFailed { error })
                            }
                        }
                    }
                    WatchAction::ResumeLocalWatch => {
                        if let Err(e) = self.mirror.resume() {
                            warn!(error = %e, "could not resume mirror watch");
                        }
                        while self.changes.try_recv().is_ok() {}
                        None
                    }
                    WatchAction::PromptPush => {
                        let confirm = self.confirm;
                        let fut = confirm.confirm("Local changes detected. Push them?");
                        match guarded(shutdown.as_mut(), &mut self.changes, fut).await {
                            None => Some(WatchEvent::ShutdownRequested),
                            Some(Answer::Yes) => Some(WatchEvent::PushConfirmed),
                            Some(Answer::No) => Some(WatchEvent::PushDeclined),
                            Some(Answer::Interrupted) => Some(WatchEvent::ShutdownRequested),
                        }
                    }
                    WatchAction::PushLocal => {
                        let fut = push_local(self.client, &self.path);
                        match guarded(shutdown.as_mut(), &mut self.changes, fut).await {
                            None => Some(WatchEvent::ShutdownRequested),
                            Some(Ok((version, pushed))) => {
                                last_synced = Some(pushed);
                                summary.pushes += 1;
                                Some(WatchEvent::PushSucceeded { version })
                            }
                            Some(Err(StepFailure::Fatal(e))) => {
                                self.mirror.release();
                                return Err(e.into());
                            }
                            Some(Err(StepFailure::Retry(error))) => {
                                Some(WatchEvent::PushFailed { error })
                            }
                        }
                    }
                    WatchAction::StopTimer => {
                        debug!("poll timer stopped");
                        None
                    }
                    WatchAction::ReleaseLocalWatch => {
                        self.mirror.release();
                        None
                    }
                    WatchAction::Emit(notice) => {
                        log_notice(&notice);
                        on_notice(&notice);
                        None
                    }
                };

                if let Some(event) = follow {
                    let shutting_down = event == WatchEvent::ShutdownRequested;
                    queue.push_back(event);
                    if shutting_down {
                        break;
                    }
                }
            }
        }

        summary.last_version = session.local_version();
        info!(pulls = summary.pulls, pushes = summary.pushes, "watch stopped");
        Ok(summary)
    }
}

/// Drive `fut` to completion unless shutdown fires first, dropping any
/// mirror change notifications that arrive meanwhile.
async fn guarded<S, T>(
    mut shutdown: Pin<&mut S>,
    changes: &mut mpsc::Receiver<()>,
    fut: impl Future<Output = T>,
) -> Option<T>
where
    S: Future<Output = ()>,
{
    let mut fut = std::pin::pin!(fut);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.as_mut() => return None,
            out = &mut fut => return Some(out),
            Some(()) = changes.recv() => debug!("busy, ignoring mirror change"),
        }
    }
}

async fn apply_remote<R: Relay>(
    client: &EnvClient<R>,
    path: &Path,
) -> Result<(Version, Digest32), StepFailure> {
    let pulled = client.pull().await?;
    tokio::fs::write(path, &pulled.plaintext)
        .await
        .map_err(|e| StepFailure::Retry(format!("writing {}: {}", path.display(), e)))?;
    Ok((pulled.version, digest(&pulled.plaintext)))
}

async fn push_local<R: Relay>(
    client: &EnvClient<R>,
    path: &Path,
) -> Result<(Version, Digest32), StepFailure> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StepFailure::Retry(format!("reading {}: {}", path.display(), e)))?;
    let outcome = client.push_unchecked(&bytes, None).await?;
    Ok((outcome.version, digest(&bytes)))
}

fn log_notice(notice: &WatchNotice) {
    match notice {
        WatchNotice::Pulled { version } => info!(version = %version, "applied remote update"),
        WatchNotice::Pushed { version } => info!(version = %version, "pushed local changes"),
        WatchNotice::PushDeclined => info!("push declined"),
        WatchNotice::PullFailed { error } => warn!(error = %error, "remote update failed"),
        WatchNotice::PushFailed { error } => warn!(error = %error, "push failed"),
    }
}
