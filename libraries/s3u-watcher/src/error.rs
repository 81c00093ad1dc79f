//! Error types for the watcher

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Watch root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Watch root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Directory walk failed: {0}")]
    WalkFailed(String),

    #[error("Watcher already started")]
    AlreadyStarted,

    #[error("Watcher stopped")]
    Stopped,

    #[error("Event receiver dropped")]
    EventsClosed,

    #[error("Poll task failed: {0}")]
    Task(String),
}
