//! S3 Uploader change detection
//!
//! Detects added and modified files under a watched directory by polling,
//! without relying on OS filesystem notifications.
//!
//! # Features
//!
//! - Periodic polling of a directory tree (size + modification time)
//! - Two-sample stabilization: a change is only reported once the file has
//!   stayed unchanged for one full poll interval
//! - Mutually exclusive poll passes
//! - Bounded event queue with backpressure
//!
//! # Architecture
//!
//! - `source`: Where file metadata comes from (local directory, in-memory tree)
//! - `detector`: The per-path tracking state machine
//! - `watcher`: Background polling loop and event queue

mod error;
mod types;

pub mod detector;
pub mod source;
pub mod watcher;

pub use detector::ChangeDetector;
pub use error::WatchError;
pub use source::{LocalSource, MemorySource, MetadataSource};
pub use types::*;
pub use watcher::{PollingWatcher, WatcherConfig};

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, WatchError>;
