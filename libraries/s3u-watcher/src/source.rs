//! Sources of file-system metadata
//!
//! A [`MetadataSource`] enumerates the regular files below a root and reports
//! their size and modification time. Per-file stat failures, dangling links
//! and link loops are returned as [`SkippedEntry`] values inside the
//! [`Scan`]; a failure to enumerate a directory fails the whole scan.

use crate::types::{FileMeta, Scan, SkippedEntry};
use crate::{Result, WatchError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

/// Enumerates regular files and their metadata
pub trait MetadataSource: Send + Sync {
    /// Walk the whole tree once
    ///
    /// # Errors
    /// Returns an error if the tree cannot be enumerated. Files whose
    /// metadata cannot be read are reported in [`Scan::skipped`] instead.
    fn scan(&self) -> Result<Scan>;
}

/// Metadata source backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
    /// Whether to follow symbolic links
    follow_links: bool,
}

impl LocalSource {
    /// Create a source rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_links: false,
        }
    }

    /// Set whether to follow symbolic links
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Turn a walk error about a single entry into a skipped entry
    ///
    /// Dangling links and link loops only affect the entry itself. Failing to
    /// read a directory, or an error without a path, still fails the walk.
    fn skip_entry(&self, err: walkdir::Error) -> Result<SkippedEntry> {
        let entry_only =
            err.loop_ancestor().is_some() || err.path().is_some_and(|path| !path.is_dir());
        let Some(path) = err.path().filter(|_| entry_only) else {
            return Err(err.into());
        };

        Ok(SkippedEntry {
            path: path.strip_prefix(&self.root).unwrap_or(path).to_path_buf(),
            reason: err
                .io_error()
                .map_or_else(|| err.to_string(), ToString::to_string),
        })
    }
}

impl MetadataSource for LocalSource {
    fn scan(&self) -> Result<Scan> {
        if !self.root.exists() {
            return Err(WatchError::RootNotFound(self.root.clone()));
        }

        if !self.root.is_dir() {
            return Err(WatchError::NotADirectory(self.root.clone()));
        }

        let mut scan = Scan::default();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(self.follow_links);

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    scan.skipped.push(self.skip_entry(e)?);
                    continue;
                }
            };

            // Directories are traversed, never reported
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };

            match read_metadata(&entry) {
                Ok((size, modified)) => {
                    scan.files.push(FileMeta::new(relative, size, modified));
                }
                Err(e) => scan.skipped.push(SkippedEntry {
                    path: relative.to_path_buf(),
                    reason: e.to_string(),
                }),
            }
        }

        Ok(scan)
    }
}

fn read_metadata(entry: &DirEntry) -> std::io::Result<(u64, SystemTime)> {
    let metadata = entry.metadata()?;
    Ok((metadata.len(), metadata.modified()?))
}

#[derive(Debug, Clone)]
enum MemoryFile {
    Present { size: u64, modified: SystemTime },
    Unreadable(String),
}

#[derive(Debug, Default)]
struct MemoryTree {
    files: BTreeMap<PathBuf, MemoryFile>,
    walk_failure: Option<String>,
}

/// In-memory metadata source
///
/// Directories are implied by the file paths. Entries can be changed between
/// scans, made unreadable, or the whole walk can be made to fail.
#[derive(Debug, Default)]
pub struct MemorySource {
    tree: Mutex<MemoryTree>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file
    pub fn insert(&self, path: impl Into<PathBuf>, size: u64, modified: SystemTime) {
        self.lock()
            .files
            .insert(path.into(), MemoryFile::Present { size, modified });
    }

    /// Remove a file, returning whether it existed
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.lock().files.remove(path.as_ref()).is_some()
    }

    /// Make the file at `path` fail its stat on subsequent scans
    pub fn fail_stat(&self, path: impl Into<PathBuf>, reason: impl Into<String>) {
        self.lock()
            .files
            .insert(path.into(), MemoryFile::Unreadable(reason.into()));
    }

    /// Make subsequent scans fail as a whole
    pub fn fail_walk(&self, reason: impl Into<String>) {
        self.lock().walk_failure = Some(reason.into());
    }

    /// Undo [`MemorySource::fail_walk`]
    pub fn restore_walk(&self) {
        self.lock().walk_failure = None;
    }

    pub fn len(&self) -> usize {
        self.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetadataSource for MemorySource {
    fn scan(&self) -> Result<Scan> {
        let tree = self.lock();

        if let Some(reason) = &tree.walk_failure {
            return Err(WatchError::WalkFailed(reason.clone()));
        }

        let mut scan = Scan::default();
        for (path, file) in &tree.files {
            match file {
                MemoryFile::Present { size, modified } => {
                    scan.files.push(FileMeta::new(path.clone(), *size, *modified));
                }
                MemoryFile::Unreadable(reason) => scan.skipped.push(SkippedEntry {
                    path: path.clone(),
                    reason: reason.clone(),
                }),
            }
        }

        Ok(scan)
    }
}
