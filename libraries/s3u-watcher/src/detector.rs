//! Change detection state machine
//!
//! Every observed path gets a tracked entry holding the last seen size and
//! modification time plus a `pending_change` flag:
//!
//! - first sighting: entry created with `pending_change = true`, no event
//! - metadata differs from the last poll: entry replaced, `pending_change = true`, no event
//! - metadata equal and `pending_change`: event emitted, `pending_change = false`
//! - metadata equal and not pending: nothing to do
//!
//! A change is therefore reported once the file has stayed unchanged for one
//! full poll interval. Files present when watching starts are treated like
//! freshly created ones and reported after their first stable poll.
//!
//! Entries are never evicted, so tracking grows with the number of distinct
//! paths ever seen.

use crate::types::{ChangeEvent, FileMeta, PollReport, Scan, TrackedEntry};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

/// Tracks file metadata across polls and decides when a change is stable
#[derive(Debug, Default)]
pub struct ChangeDetector {
    tracking: Mutex<HashMap<PathBuf, TrackedEntry>>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one file observation into the state machine
    ///
    /// Returns an event when the file has stabilized after a change.
    pub fn observe(&self, meta: FileMeta) -> Option<ChangeEvent> {
        let mut tracking = self.lock();
        Self::observe_locked(&mut tracking, meta)
    }

    /// Apply a complete scan, returning the events it produced
    pub fn apply(&self, scan: Scan) -> (Vec<ChangeEvent>, PollReport) {
        let mut report = PollReport {
            files_seen: scan.files.len(),
            skipped: scan.skipped.len(),
            changed: 0,
        };

        for skipped in &scan.skipped {
            warn!(path = %skipped.path.display(), error = %skipped.reason, "Failed to stat file");
        }

        let mut tracking = self.lock();
        let events: Vec<ChangeEvent> = scan
            .files
            .into_iter()
            .filter_map(|meta| Self::observe_locked(&mut tracking, meta))
            .collect();

        report.changed = events.len();
        (events, report)
    }

    /// Number of paths ever observed
    pub fn tracked_count(&self) -> usize {
        self.lock().len()
    }

    /// Whether `path` has an unreported change
    pub fn is_pending(&self, path: impl AsRef<Path>) -> bool {
        self.lock()
            .get(path.as_ref())
            .is_some_and(|entry| entry.pending_change)
    }

    fn observe_locked(
        tracking: &mut HashMap<PathBuf, TrackedEntry>,
        meta: FileMeta,
    ) -> Option<ChangeEvent> {
        trace!(
            path = %meta.path.display(),
            size = meta.size,
            modified = ?meta.modified,
            "Retrieved file info"
        );

        let current = TrackedEntry {
            size: meta.size,
            modified: meta.modified,
            pending_change: true,
        };

        let Some(tracked) = tracking.get_mut(&meta.path) else {
            debug!(path = %meta.path.display(), "Tracking new file");
            tracking.insert(meta.path, current);
            return None;
        };

        if !tracked.matches(&meta) {
            debug!(path = %meta.path.display(), "File changed, waiting for it to settle");
            *tracked = current;
            return None;
        }

        if !tracked.pending_change {
            return None;
        }

        tracked.pending_change = false;
        debug!(path = %meta.path.display(), "File settled");
        Some(ChangeEvent { path: meta.path })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, TrackedEntry>> {
        self.tracking.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
