//! Snapshot version bookkeeping for envsync.
//!
//! Versions are assigned by the relay and strictly increase by one per push.
//! This module holds the pure parts of version handling:
//! - the advisory conflict gate evaluated before a push
//! - a page walker for collecting the full snapshot history
//!
//! Neither performs I/O. The client fetches the relay's version or history
//! pages and feeds the results in.

use envsync_types::Version;

/// Outcome of the advisory conflict check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictCheck {
    /// Safe to push without asking.
    Clear,
    /// The relay moved ahead of what this workspace last pushed.
    Conflict {
        /// Last version this workspace is known to have pushed.
        local: Version,
        /// Current head version on the relay.
        remote: Version,
    },
}

impl ConflictCheck {
    /// Whether the user must confirm before pushing.
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Decide whether a push needs explicit confirmation.
///
/// `remote` is `None` when the version lookup failed; the push then goes
/// ahead unchecked. A workspace that has never pushed (`last_known == 0`)
/// is never warned.
pub fn check_conflict(last_known: Version, remote: Option<Version>, force: bool) -> ConflictCheck {
    if force || last_known.is_zero() {
        return ConflictCheck::Clear;
    }
    match remote {
        Some(remote) if remote > last_known => ConflictCheck::Conflict {
            local: last_known,
            remote,
        },
        _ => ConflictCheck::Clear,
    }
}

/// Walks history pages until the cumulative count reaches the reported total.
///
/// ```ignore
/// let mut walk = HistoryWalk::new(50);
/// while let Some(page) = walk.next_page() {
///     let resp = relay.history(&project, page, walk.limit()).await?;
///     walk.record(resp.entries.len(), resp.total);
///     all.extend(resp.entries);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HistoryWalk {
    limit: u32,
    next: u32,
    fetched: u64,
    total: Option<u64>,
    exhausted: bool,
}

impl HistoryWalk {
    /// Start a walk at page 1 with the given page size (minimum 1).
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            next: 1,
            fetched: 0,
            total: None,
            exhausted: false,
        }
    }

    /// Page size to request.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Entries collected so far.
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// The next page to fetch, or `None` when the walk is complete.
    pub fn next_page(&self) -> Option<u32> {
        if self.exhausted {
            return None;
        }
        match self.total {
            Some(total) if self.fetched >= total => None,
            _ => Some(self.next),
        }
    }

    /// Record a fetched page.
    ///
    /// An empty page ends the walk even if the relay's total says otherwise,
    /// so a relay that over-reports cannot make the walk spin forever.
    pub fn record(&mut self, entries: usize, total: u64) {
        self.total = Some(total);
        if entries == 0 {
            self.exhausted = true;
            return;
        }
        self.fetched = self.fetched.saturating_add(entries as u64);
        self.next = self.next.saturating_add(1);
    }
}
