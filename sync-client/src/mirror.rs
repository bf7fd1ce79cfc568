//! Change notifications for the local plaintext mirror.
//!
//! The parent directory is watched (not the file itself) so editors that
//! save by rename-and-replace are still seen; events are filtered down to
//! the mirror's file name and collapsed by the debouncer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Mirror watch errors.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The mirror path has no parent directory or file name.
    #[error("cannot watch {0}: not a file path")]
    InvalidPath(PathBuf),

    /// The OS file watcher failed.
    #[error("file watch error: {0}")]
    Notify(#[from] notify::Error),
}

/// Control over the mirror file watch, as used by the watch loop.
pub trait MirrorWatch: Send {
    /// Stop delivering change notifications.
    fn suspend(&mut self) -> Result<(), MirrorError>;

    /// Start delivering change notifications again.
    fn resume(&mut self) -> Result<(), MirrorError>;

    /// Tear the watch down for good.
    fn release(&mut self);
}

type MirrorDebouncer = Debouncer<RecommendedWatcher, RecommendedCache>;

/// OS-backed watch on one mirror file.
pub struct FileMirror {
    debouncer: Option<MirrorDebouncer>,
    dir: PathBuf,
    watching: bool,
}

impl FileMirror {
    /// Watch `path`, sending `()` on `tx` after each debounced change.
    pub fn start(
        path: &Path,
        debounce: Duration,
        tx: mpsc::Sender<()>,
    ) -> Result<Self, MirrorError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| MirrorError::InvalidPath(path.to_path_buf()))?;
        let dir = match path.parent() {
            Some(p) if p.as_os_str().is_empty() => PathBuf::from("."),
            Some(p) => p.to_path_buf(),
            None => return Err(MirrorError::InvalidPath(path.to_path_buf())),
        };

        let debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let relevant = events.iter().any(|event| {
                        matches!(
                            event.event.kind,
                            EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                        ) && event
                            .event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == Some(file_name.as_os_str()))
                    });
                    if relevant {
                        // A full channel already holds a pending notification.
                        let _ = tx.try_send(());
                    }
                }
                Err(errors) => errors
                    .iter()
                    .for_each(|error| warn!(error = %error, "mirror watch error")),
            }
        })?;

        let mut mirror = Self {
            debouncer: Some(debouncer),
            dir,
            watching: false,
        };
        mirror.resume()?;
        Ok(mirror)
    }
}

impl MirrorWatch for FileMirror {
    fn suspend(&mut self) -> Result<(), MirrorError> {
        if let (Some(debouncer), true) = (self.debouncer.as_mut(), self.watching) {
            debouncer.unwatch(&self.dir)?;
            self.watching = false;
            debug!(dir = %self.dir.display(), "mirror watch suspended");
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), MirrorError> {
        if let (Some(debouncer), false) = (self.debouncer.as_mut(), self.watching) {
            debouncer.watch(&self.dir, RecursiveMode::NonRecursive)?;
            self.watching = true;
            debug!(dir = %self.dir.display(), "mirror watch active");
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(debouncer) = self.debouncer.take() {
            debouncer.stop();
            self.watching = false;
            debug!(dir = %self.dir.display(), "mirror watch released");
        }
    }
}

impl Drop for FileMirror {
    fn drop(&mut self) {
        self.release();
    }
}
