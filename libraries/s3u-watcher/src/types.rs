//! Core types for change detection

use std::path::PathBuf;
use std::time::SystemTime;

/// Metadata of a regular file, as seen by one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Path relative to the watch root
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl FileMeta {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
        }
    }
}

/// A file whose metadata could not be read during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of enumerating the watched tree once
#[derive(Debug, Clone, Default)]
pub struct Scan {
    /// Regular files found
    pub files: Vec<FileMeta>,
    /// Files that were found but could not be stat'ed
    pub skipped: Vec<SkippedEntry>,
}

/// Signal that a path has stabilized after a change
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    /// Path relative to the watch root
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Per-path tracking state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrackedEntry {
    pub size: u64,
    pub modified: SystemTime,
    /// Set when a change was seen and not yet reported
    pub pending_change: bool,
}

impl TrackedEntry {
    pub fn matches(&self, meta: &FileMeta) -> bool {
        self.size == meta.size && self.modified == meta.modified
    }
}

/// Statistics for one completed poll pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Regular files whose metadata was read
    pub files_seen: usize,
    /// Files skipped because their metadata could not be read
    pub skipped: usize,
    /// Change events produced by this pass
    pub changed: usize,
}

/// Outcome of a request to run a poll pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed(PollReport),
    /// Another pass was still running
    Skipped,
}
